/// Display version information
pub fn execute() {
    println!("sigil {}", env!("CARGO_PKG_VERSION"));
    println!("Identity store and protocol engine bridge");
}
