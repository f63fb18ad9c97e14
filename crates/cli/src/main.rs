fn main() {
    if let Err(error) = keypath_cli::run() {
        // run() installs the subscriber right after argument parsing, so the
        // error is logged through it.
        let chain = format!("{error:#}");
        tracing::error!(error = %chain, "keypath failed");
        std::process::exit(1);
    }
}
