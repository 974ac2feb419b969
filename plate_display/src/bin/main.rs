use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::Client;
use rumqttc::v5::Event;
use rumqttc::v5::Incoming;
use rumqttc::v5::MqttOptions;

use plate_display::CharacterDisplay;
use plate_display::ConsoleDisplay;
use plate_display::DisplayContext;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Show license plates received over MQTT on a character display"
)]
struct Args {
    /// MQTT broker host.
    #[arg(long, env = "MQTT_BROKER_HOST", default_value = "test.mosquitto.org")]
    broker: String,

    /// MQTT broker port.
    #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = 1883)]
    port: u16,

    /// Topic the plates arrive on.
    #[arg(long, env = "MQTT_TOPIC", default_value = "plates/detected")]
    topic: String,

    /// MQTT client identifier.
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "plate_display")]
    client_id: String,

    /// I2C bus device of a PCF8574-backed 16x2 LCD, e.g. /dev/i2c-1.
    /// Without it the display is drawn on the terminal.
    #[arg(long, env = "PLATE_DISPLAY_I2C_BUS")]
    i2c_bus: Option<String>,

    /// I2C address of the LCD backpack.
    #[arg(long, env = "PLATE_DISPLAY_I2C_ADDRESS", value_parser = parse_address, default_value = "0x27")]
    i2c_address: u8,
}

fn parse_address(raw: &str) -> std::result::Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid I2C address {raw:?}: {e}"))
}

#[cfg(target_os = "linux")]
fn open_display(args: &Args) -> Result<Box<dyn CharacterDisplay>> {
    use plate_display::lcd::Lcd1602;
    use plate_display::lcd::LinuxI2cBus;

    match &args.i2c_bus {
        Some(path) => {
            let bus = LinuxI2cBus::open(path).with_context(|| format!("opening {path}"))?;
            let lcd = Lcd1602::new(bus, args.i2c_address).context("initialising LCD")?;
            log::info!("Using LCD at {:#04x} on {}", args.i2c_address, path);
            Ok(Box::new(lcd))
        }
        None => Ok(Box::new(ConsoleDisplay::stdout())),
    }
}

#[cfg(not(target_os = "linux"))]
fn open_display(args: &Args) -> Result<Box<dyn CharacterDisplay>> {
    if args.i2c_bus.is_some() {
        anyhow::bail!("I2C displays are only supported on Linux");
    }
    Ok(Box::new(ConsoleDisplay::stdout()))
}

fn show_status(ctx: &mut DisplayContext, lines: &[&str]) {
    if let Err(e) = ctx.show_status(lines) {
        log::warn!("Failed to update display: {}", e);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut ctx = DisplayContext::new(open_display(&args)?);
    show_status(&mut ctx, &["Initializing..."]);

    let mut options = MqttOptions::new(args.client_id.clone(), args.broker.clone(), args.port);
    options.set_keep_alive(Duration::from_secs(60));
    let (client, mut connection) = Client::new(options, 10);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    let shutdown_client = client.clone();
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::SeqCst);
        if let Err(e) = shutdown_client.try_disconnect() {
            log::debug!("Disconnect request not queued: {}", e);
        }
    })
    .context("installing Ctrl-C handler")?;

    log::info!("Connecting to {}:{}", args.broker, args.port);
    for event in connection.iter() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                log::info!("Connected to MQTT broker");
                match client.try_subscribe(args.topic.as_str(), QoS::AtLeastOnce) {
                    Ok(()) => log::info!("Subscribed to {}", args.topic),
                    Err(e) => log::error!("Failed to subscribe to {}: {}", args.topic, e),
                }
                show_status(&mut ctx, &["Waiting for", "License Plate"]);
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let topic = match std::str::from_utf8(&publish.topic) {
                    Ok(topic) => topic.to_string(),
                    Err(e) => {
                        log::warn!("Skipping publish with invalid topic: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ctx.handle_message(&topic, &publish.payload) {
                    log::error!("Error processing message: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("MQTT connection error: {}. Reconnecting...", e);
                show_status(&mut ctx, &["MQTT Error"]);
                // The next poll reconnects.
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }

    show_status(&mut ctx, &[]);
    log::info!("Stopped");
    Ok(())
}
