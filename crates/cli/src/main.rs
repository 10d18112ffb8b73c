fn main() {
    scorebook_cli::init_logging();

    if let Err(error) = scorebook_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
