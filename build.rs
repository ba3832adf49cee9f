fn main() {
    if !cfg!(target_os = "linux") {
        panic!(
            "{} only works with linux (pseudo terminals and /proc are required)",
            env!("CARGO_PKG_NAME")
        );
    }
}
