#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_backtrace as _;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use lorabridge::{
    config::{GatewayConfig, radio},
    connectivity::{ConnectOutcome, ConnectivityManager, LinkState, RetryPolicy},
    credentials::FixedCredentials,
    hardware::LoRaHardware,
    model::{ConnectivityStatus, Credentials, RawPacket},
    protocol::{self, ForwardRequest, Rejected},
    sx127x::EXPECTED_VERSION,
    traits::RadioSource,
    wifi::StationLink,
};

const LISTEN_WINDOW_SECS: u64 = 15;

esp_bootloader_esp_idf::esp_app_desc!();

// Test result tracking
struct TestResults {
    passed: u32,
    failed: u32,
    total: u32,
}

impl TestResults {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
            total: 0,
        }
    }

    fn assert(&mut self, condition: bool, test_name: &str) {
        self.total += 1;
        if condition {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED", test_name);
        }
    }

    fn assert_eq<T: PartialEq + core::fmt::Debug>(&mut self, left: T, right: T, test_name: &str) {
        self.total += 1;
        if left == right {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED: {:?} != {:?}", test_name, left, right);
        }
    }

    fn print_summary(&self) {
        esp_println::println!("\n==========================================");
        esp_println::println!("Test Summary:");
        esp_println::println!("  Total:  {}", self.total);
        esp_println::println!("  Passed: {}", self.passed);
        esp_println::println!("  Failed: {}", self.failed);
        if self.failed == 0 {
            esp_println::println!("\n✓ ALL TESTS PASSED!");
        } else {
            esp_println::println!("\n✗ SOME TESTS FAILED");
        }
        esp_println::println!("==========================================");
    }
}

fn test_frame_protocol(results: &mut TestResults) {
    esp_println::println!("\n[TEST] Frame Protocol Tests");

    match protocol::parse(b"9525|23.5|60|ON", "9525") {
        Ok(frame) => {
            results.assert_eq(frame.temperature, "23.5", "temperature field");
            results.assert_eq(frame.humidity, "60", "humidity field");
            results.assert_eq(frame.light_state, "ON", "light state field");

            match ForwardRequest::build("http://192.168.2.101/esp32/guardar_datos.php", &frame) {
                Ok(request) => results.assert_eq(
                    request.url(),
                    "http://192.168.2.101/esp32/guardar_datos.php?temperature=23.5&humidity=60&ledState=ON",
                    "forward URL",
                ),
                Err(e) => {
                    esp_println::println!("    Failed to build URL: {}", e);
                    results.assert(false, "forward URL");
                }
            }
        }
        Err(e) => {
            esp_println::println!("    Rejected: {:?}", e);
            results.assert(false, "valid frame accepted");
        }
    }

    results.assert_eq(
        protocol::parse(b"1234|23.5|60|ON", "9525").err(),
        Some(Rejected::UnrecognizedSender),
        "foreign sender rejected",
    );
    results.assert_eq(
        protocol::parse(b"9525|23.5", "9525").err(),
        Some(Rejected::Malformed),
        "short frame rejected",
    );
}

async fn test_lora_radio(
    results: &mut TestResults,
    spi2: esp_hal::peripherals::SPI2<'static>,
    pins: (
        esp_hal::peripherals::GPIO5<'static>,
        esp_hal::peripherals::GPIO19<'static>,
        esp_hal::peripherals::GPIO27<'static>,
        esp_hal::peripherals::GPIO18<'static>,
        esp_hal::peripherals::GPIO14<'static>,
    ),
) {
    esp_println::println!("\n[TEST] SX1276 Radio Tests");

    let (sck, miso, mosi, cs, rst) = pins;
    let lora = match LoRaHardware::new(spi2, sck, miso, mosi, cs, rst) {
        Ok(lora) => lora,
        Err(e) => {
            esp_println::println!("  SPI setup failed: {}", e);
            results.assert(false, "SPI setup");
            return;
        }
    };
    results.assert(true, "SPI setup");

    let mut receiver = lora.into_radio();
    match receiver.begin(radio::FREQUENCY_HZ) {
        Ok(()) => {
            esp_println::println!("    Chip version: 0x{:02X}", EXPECTED_VERSION);
            results.assert(true, "radio initialization");
        }
        Err(e) => {
            esp_println::println!("  Radio init failed: {}", e);
            results.assert(false, "radio initialization");
            return;
        }
    }

    esp_println::println!("  Listening for {} s...", LISTEN_WINDOW_SECS);
    let deadline = Instant::now() + Duration::from_secs(LISTEN_WINDOW_SECS);
    let mut polls_ok = true;
    let mut received = 0u32;
    while Instant::now() < deadline {
        match receiver.parse_packet() {
            Ok(0) => {}
            Ok(_) => {
                let mut packet = RawPacket::new();
                while let Ok(true) = receiver.available() {
                    match receiver.read() {
                        Ok(byte) => {
                            let _ = packet.push(byte);
                        }
                        Err(_) => break,
                    }
                }
                received += 1;
                match core::str::from_utf8(&packet) {
                    Ok(text) => esp_println::println!("    Packet: {}", text),
                    Err(_) => esp_println::println!("    Packet: {} bytes", packet.len()),
                }
            }
            Err(e) => {
                esp_println::println!("    Poll failed: {}", e);
                polls_ok = false;
                break;
            }
        }
        Timer::after(Duration::from_millis(50)).await;
    }
    results.assert(polls_ok, "receiver polls without bus errors");
    esp_println::println!("    Packets heard: {}", received);
}

async fn test_wifi_join(
    results: &mut TestResults,
    wifi: esp_hal::peripherals::WIFI<'static>,
) {
    esp_println::println!("\n[TEST] WiFi Join Tests");

    let (Some(ssid), Some(password)) = (
        option_env!("LORABRIDGE_TEST_SSID"),
        option_env!("LORABRIDGE_TEST_PASSWORD"),
    ) else {
        esp_println::println!("  Skipped: LORABRIDGE_TEST_SSID/PASSWORD not set at build time");
        return;
    };

    let credentials = match Credentials::new(ssid, password) {
        Ok(credentials) => credentials,
        Err(e) => {
            esp_println::println!("  {}", e);
            results.assert(false, "test credentials fit");
            return;
        }
    };

    static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_controller = match esp_radio::init() {
        Ok(controller) => RADIO_CONTROLLER.init(controller),
        Err(e) => {
            esp_println::println!("  Radio init failed: {:?}", e);
            results.assert(false, "radio controller init");
            return;
        }
    };
    let (controller, _interfaces) =
        match esp_radio::wifi::new(radio_controller, wifi, Default::default()) {
            Ok(pair) => pair,
            Err(e) => {
                esp_println::println!("  WiFi init failed: {:?}", e);
                results.assert(false, "wifi driver init");
                return;
            }
        };

    let link = LinkState::new();
    let config = GatewayConfig {
        retry: RetryPolicy::Rounds(2),
        ..GatewayConfig::from_env()
    };
    let mut manager = ConnectivityManager::new(
        StationLink::new(controller),
        FixedCredentials(credentials),
        Delay,
        &link,
        &config,
    );

    let outcome = manager.establish().await;
    results.assert_eq(outcome, ConnectOutcome::Connected, "joined test network");
    results.assert_eq(link.status(), ConnectivityStatus::Connected, "link state published");
    results.assert_eq(manager.refresh(), ConnectivityStatus::Connected, "link still up");
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());
    esp_alloc::heap_allocator!(size: 72 * 1024);

    esp_println::println!("\n==========================================");
    esp_println::println!("=== Hardware Unit Test Runner ===");
    esp_println::println!("==========================================");

    let mut results = TestResults::new();

    // Run tests that don't need hardware
    test_frame_protocol(&mut results);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    test_lora_radio(
        &mut results,
        peripherals.SPI2,
        (
            peripherals.GPIO5,
            peripherals.GPIO19,
            peripherals.GPIO27,
            peripherals.GPIO18,
            peripherals.GPIO14,
        ),
    )
    .await;

    test_wifi_join(&mut results, peripherals.WIFI).await;

    results.print_summary();

    esp_println::println!("\nTest run complete. Looping...");
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
