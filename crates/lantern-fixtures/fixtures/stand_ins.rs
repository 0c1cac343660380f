pub fn fetch(key: u32) -> i64 {
    i64::from(key) * 10
}

pub fn lookup(key: u32) -> &'static str {
    if fetch(key) > 100 {
        "high"
    } else {
        "low"
    }
}
