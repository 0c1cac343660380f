pub fn count() -> usize {
    3
}

pub fn total(extra: usize) -> usize {
    let count = count();
    if extra > count {
        count + extra
    } else {
        count
    }
}
