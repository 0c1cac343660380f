pub fn pick(values: Vec<u8>) -> Vec<u8> {
    let bump = |x: u8| if x > 200 { x } else { x + 1 };
    let first = bump(values.first().copied().unwrap_or(0));
    let keep = |x: &u8| *x > 0;
    let mut kept: Vec<u8> = values.into_iter().filter(|x| keep(x)).collect();
    kept.push(first);
    kept
}
