/// Installs the global logger: `Debug` when `debug` is set, `Info` otherwise.
/// `RUST_LOG` directives are applied on top.
pub fn init_logger(debug: bool) {
    env_logger::Builder::new()
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();
}
