//! dockhand binary entry point

fn main() {
    if let Err(e) = dockhand::run() {
        dockhand::print_error(&e);
        std::process::exit(1);
    }
}
