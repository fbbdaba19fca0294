/// Display version information
pub fn execute() {
    println!("warden {}", env!("CARGO_PKG_VERSION"));
    println!("Verification gate bot core");
}
