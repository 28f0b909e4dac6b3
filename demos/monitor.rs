use std::env;

use tracing::level_filters::LevelFilter;
use venstar_colortouch::{ConfigStore, Controller, Event, Settings};

#[tokio::main]
async fn main() -> venstar_colortouch::Result<()> {
    let args: Vec<String> = env::args().collect();
    let settings = match args.get(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let store = match args.get(2) {
        Some(path) => ConfigStore::load(path)?,
        None => ConfigStore::in_memory(),
    };

    let level = store.log_level().unwrap_or(settings.log_level);
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .init();

    let short = settings.short_poll_interval();
    let long = settings.long_poll_interval();

    let mut controller = Controller::new(settings, store);
    controller.on_event(|event| match event {
        Event::DriverChanged {
            address,
            driver,
            value,
            uom,
        } => println!("[{address}] {} = {value} (uom {})", driver.code(), uom.code()),
        Event::TempUnitChanged { address, unit } => println!("[{address}] unit now {unit}"),
    });

    let restored = controller.restore()?;
    println!("Restored {restored} thermostat(s). Discovering...");
    let report = controller.discover().await?;
    for notice in controller.notices() {
        println!("NOTICE: {notice}");
    }
    println!(
        "{} new, {} known. Polling every {}s / {}s (ctrl-c to stop)",
        report.added.len(),
        report.reused.len(),
        short.as_secs(),
        long.as_secs()
    );

    let mut short_tick = tokio::time::interval(short);
    let mut long_tick = tokio::time::interval(long);
    loop {
        tokio::select! {
            _ = short_tick.tick() => {
                if let Err(e) = controller.short_poll().await {
                    eprintln!("Short poll error: {e}");
                }
            }
            _ = long_tick.tick() => {
                if let Err(e) = controller.long_poll().await {
                    eprintln!("Long poll error: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.shutdown()?;
    println!("Stopped.");
    Ok(())
}
