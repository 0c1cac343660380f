pub fn doubled(values: &[u8]) -> impl Iterator<Item = u8> + '_ {
    values.iter().map(|x| if *x > 100 { 255 } else { x * 2 })
}
