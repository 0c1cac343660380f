pub const LIMIT: u32 = 10;

pub struct Counter {
    pub value: u32,
}

impl Counter {
    pub fn bump(&mut self, step: u32) -> u32 {
        match self.value {
            LIMIT => self.value,
            value => {
                self.value = value + step;
                self.value
            }
        }
    }
}
