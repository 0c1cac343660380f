use std::thread;

pub fn launch(n: u32) -> u32 {
    let doubled = thread::spawn(move || {
        if n > 1 {
            n * 2
        } else {
            n
        }
    });
    let fixed = thread::spawn(|| {
        let base = 7;
        if base > 3 {
            base
        } else {
            0
        }
    });
    doubled.join().unwrap_or(0) + fixed.join().unwrap_or(0)
}
