pub fn split(x: i32) -> (i32, bool) {
    if x > 0 {
        return (x, true);
    } else if x < 0 {
        return (-x, false);
    }
    match x {
        0 => (0, true),
        _ => (x, false),
    }
}
