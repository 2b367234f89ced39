// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

fn main() -> anyhow::Result<()> {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use anyhow::Context;
    use wfp_monitor::system::platform::FwpPlatform;
    use wfp_monitor::system::Monitor;
    use wfp_monitor::{CliArgs, Config, Session, StdoutSink};

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = CliArgs::from_env();
    let mut config = if Path::new(&cli.config).exists() {
        Config::load(Path::new(&cli.config))
            .with_context(|| format!("failed to load '{}'", cli.config))?
    } else {
        tracing::debug!(path = cli.config.as_str(), "no configuration file, using defaults");
        Config::default()
    };
    cli.apply(&mut config);

    let requested = config.requested_level()?;
    let timeout = Duration::from_millis(config.negotiate_timeout_ms);

    let platform = Arc::new(
        FwpPlatform::open(config.show_all).context("failed to open the filtering platform")?,
    );
    let session = Session::new(
        config.policy(),
        config.time_format,
        config.screen_width,
        platform.clone(),
        StdoutSink,
    );
    let mut monitor = Monitor::new(platform, session, requested, timeout);

    if cli.dump {
        let (level, count) = monitor.dump_recorded()?;
        tracing::info!(level = level.as_u8(), count = count, "dumped recorded events");
        if let Ok(mut session) = monitor.session().lock() {
            session.print_statistics();
        }
        return Ok(());
    }

    let level = monitor.start()?;
    tracing::info!(level = level.as_u8(), "monitoring, ctrl-c to stop");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    monitor.stop();
    if let Ok(mut session) = monitor.session().lock() {
        session.print_statistics();
    }

    Ok(())
}
