use vkdispatch::{AppError, RunConfig, DEFAULT_CONFIG_FILE, UNKNOWN_ERROR};

fn main() {
    let handler = match std::thread::Builder::new().name("vkdispatch".into()).spawn(real_main) {
        Ok(h) => h,
        Err(e) => {
            println!("{}: failed to spawn main thread: {}", UNKNOWN_ERROR, e);
            std::process::exit(-1);
        }
    };
    match handler.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("{}: {}", e.category(), e);
            println!("{}: {}", e.category(), e);
            std::process::exit(-1);
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            log::error!("{}: {}", UNKNOWN_ERROR, msg);
            println!("{}", UNKNOWN_ERROR);
            std::process::exit(-1);
        }
    }
}

fn real_main() -> Result<(), AppError> {
    let config = RunConfig::load_or_default(DEFAULT_CONFIG_FILE);

    // Configure logging first so a bad config file is still reported.
    let level = config
        .as_ref()
        .ok()
        .and_then(|c| c.level_filter().ok())
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .init();

    let config = config?;
    log::debug!("config: {:?}", config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    vkdispatch::run(&config, &mut out)
}
