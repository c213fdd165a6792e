fn main() {
    if let Err(err) = ad_diagnostics::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
