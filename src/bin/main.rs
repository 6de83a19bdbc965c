#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Delay, Duration, Timer};
use esp_backtrace as _;
use esp_hal::{
    interrupt::software::SoftwareInterruptControl,
    rng::Rng,
    system::Stack,
    timer::timg::TimerGroup,
    uart::{Config as UartConfig, Uart},
};
use esp_radio::wifi::WifiDevice;
use esp_rtos::embassy::Executor;
use static_cell::StaticCell;

use lorabridge::{
    config::{GatewayConfig, radio},
    connectivity::{ConnectOutcome, ConnectivityManager, LinkState},
    credentials::{ConsolePrompt, UartConsole},
    hardware::{LoRaHardware, LoRaSpi},
    http::HttpClient,
    relay::RelayPipeline,
    supervisor::Supervisor,
    sx127x::Sx127x,
    wifi::{StackStatus, StationLink},
};

const HEAP_SIZE: usize = 72 * 1024;
const APP_CORE_STACK_SIZE: usize = 16 * 1024;
const CONSOLE_BAUD: u32 = 9_600;

static LINK: LinkState = LinkState::new();
static CONFIG: GatewayConfig = GatewayConfig::from_env();

type GatewayPrompt = ConsolePrompt<UartConsole, Delay>;
type GatewaySupervisor = Supervisor<'static, StationLink, GatewayPrompt, Delay, Delay>;
type GatewayRelay = RelayPipeline<Sx127x<LoRaSpi<'static>>, HttpClient, StackStatus, Delay>;

esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn run_supervisor(supervisor: GatewaySupervisor) {
    supervisor.run().await
}

#[embassy_executor::task]
async fn run_relay(relay: GatewayRelay) {
    relay.run().await
}

#[embassy_executor::task]
async fn run_network(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

async fn halt() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());
    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    esp_println::println!("=== LoRa Bridge ===");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Console for the credential prompt
    let uart = match Uart::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(CONSOLE_BAUD),
    ) {
        Ok(uart) => uart
            .with_rx(peripherals.GPIO3)
            .with_tx(peripherals.GPIO1)
            .into_async(),
        Err(e) => {
            log::error!("[CONSOLE] UART init failed: {:?}", e);
            halt().await
        }
    };

    static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_controller = match esp_radio::init() {
        Ok(controller) => RADIO_CONTROLLER.init(controller),
        Err(e) => {
            log::error!("[WIFI] Radio init failed: {:?}", e);
            halt().await
        }
    };
    let (controller, interfaces) =
        match esp_radio::wifi::new(radio_controller, peripherals.WIFI, Default::default()) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("[WIFI] Driver init failed: {:?}", e);
                halt().await
            }
        };

    // Join before anything else runs
    let mut manager = ConnectivityManager::new(
        StationLink::new(controller),
        ConsolePrompt::new(UartConsole::new(uart), Delay),
        Delay,
        &LINK,
        &CONFIG,
    );
    if manager.establish().await == ConnectOutcome::GaveUp {
        log::warn!("[WIFI] Starting without a network, the supervisor keeps trying");
    }

    let lora = match LoRaHardware::new(
        peripherals.SPI2,
        peripherals.GPIO5,
        peripherals.GPIO19,
        peripherals.GPIO27,
        peripherals.GPIO18,
        peripherals.GPIO14,
    ) {
        Ok(lora) => lora,
        Err(e) => {
            log::error!("[LORA] Bus init failed: {}", e);
            halt().await
        }
    };
    let mut receiver = lora.into_radio();
    if let Err(e) = receiver.begin(radio::FREQUENCY_HZ) {
        log::error!("[LORA] Starting LoRa failed: {}", e);
        halt().await
    }
    log::info!("[LORA] Receiver ready on {} Hz", radio::FREQUENCY_HZ);

    let seed = {
        let rng = Rng::new();
        (u64::from(rng.random()) << 32) | u64::from(rng.random())
    };
    let station = interfaces.sta;

    // Core 1: network stack and relay
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    static APP_CORE_STACK: StaticCell<Stack<APP_CORE_STACK_SIZE>> = StaticCell::new();
    let app_core_stack = APP_CORE_STACK.init(Stack::new());

    esp_rtos::start_second_core(
        peripherals.CPU_CTRL,
        sw_int.software_interrupt0,
        sw_int.software_interrupt1,
        app_core_stack,
        move || {
            static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
            let (stack, runner) = embassy_net::new(
                station,
                embassy_net::Config::dhcpv4(Default::default()),
                STACK_RESOURCES.init(StackResources::new()),
                seed,
            );
            let relay = RelayPipeline::new(
                receiver,
                HttpClient::new(stack),
                StackStatus::new(stack),
                Delay,
                &CONFIG,
            );

            static EXECUTOR: StaticCell<Executor> = StaticCell::new();
            let executor = EXECUTOR.init(Executor::new());
            executor.run(|spawner| {
                spawner.must_spawn(run_network(runner));
                spawner.must_spawn(run_relay(relay));
            });
        },
    );

    // Core 0: connectivity supervision
    let supervisor = Supervisor::new(manager, Delay, CONFIG.reconnect_interval_ms);
    if let Err(e) = spawner.spawn(run_supervisor(supervisor)) {
        log::error!("[SUPERVISOR] Failed to spawn task: {:?}", e);
    }
}
