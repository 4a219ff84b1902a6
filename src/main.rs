fn main() {
    // Project path is the only argument; everything else lives in the
    // project document itself.
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "project.json".to_string());

    if let Err(e) = modgate_lib::run(&path) {
        eprintln!("modgate: {}", e);
        std::process::exit(1);
    }
}
