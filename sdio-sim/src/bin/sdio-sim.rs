use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fugit::HertzU32;
use sdio_host::{
    BlockMode,
    BusWidth,
    Config,
    FunctionNumber,
    Mode,
    OpCode,
    TransferData,
    cccr::CCCR_REGISTERS,
};
use sdio_sim::{CardConfig, SimHost, Simulation};
use strum::Display;

// ----------------------------------------------------------------------------
// Command-line Interface

#[derive(Debug, Parser)]
#[command(about = "Drive a simulated SDIO card through the sdio-host engine")]
struct Cli {
    /// Bus mode.
    #[arg(long, value_enum, default_value_t = BusMode::Sd)]
    mode: BusMode,
    /// Bus clock in kHz after initialization.
    #[arg(long, default_value_t = 25_000)]
    clock_khz: u32,
    /// Number of I/O functions of the card.
    #[arg(long, default_value_t = 1)]
    functions: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
enum BusMode {
    Sd,
    Spi,
}

impl From<BusMode> for Mode {
    fn from(val: BusMode) -> Self {
        match val {
            BusMode::Sd => Mode::Sd,
            BusMode::Spi => Mode::Spi,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
enum Width {
    One,
    Four,
}

impl From<Width> for BusWidth {
    fn from(val: Width) -> Self {
        match val {
            Width::One => BusWidth::One,
            Width::Four => BusWidth::Four,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize the card and print its context.
    Init(InitArgs),
    /// Read bytes from a function with CMD53.
    Read(ReadArgs),
    /// Write bytes to a function with CMD53 and read them back.
    Write(WriteArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Dump the CCCR, FBRs and CIS after initialization.
    #[arg(long)]
    dump: bool,
}

#[derive(Debug, Args)]
struct TransferArgs {
    /// Function number.
    function: u8,
    /// Register address, decimal or 0x-prefixed hex.
    #[arg(value_parser = parse_u32)]
    address: u32,
    /// Data bus width.
    #[arg(long, value_enum, default_value_t = Width::One)]
    width: Width,
}

#[derive(Debug, Args)]
struct ReadArgs {
    #[command(flatten)]
    transfer: TransferArgs,
    /// Number of bytes.
    #[arg(default_value_t = 16)]
    count: u16,
}

#[derive(Debug, Args)]
struct WriteArgs {
    #[command(flatten)]
    transfer: TransferArgs,
    /// Data as a hex string.
    #[arg(value_parser = parse_hex)]
    data: HexData,
}

#[derive(Clone, Debug)]
struct HexData(Vec<u8>);

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };

    parsed.map_err(|e| e.to_string())
}

fn parse_hex(s: &str) -> Result<HexData, String> {
    if s.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{s}'"));
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()
        .map(HexData)
}

// ----------------------------------------------------------------------------
// Application

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let sim = Simulation::new(CardConfig::new().with_functions(cli.functions));
    let mut host = sim.host(cli.mode.into(), Config::new())?;

    let dump = matches!(cli.command, Command::Init(InitArgs { dump: true }));
    let card = host.sdio_init(dump)?;
    host.set_clock_rate(HertzU32::kHz(cli.clock_khz))?;

    log::info!(
        "card ready in {} mode: RCA {:#06x}, {} function(s), OCR {:#08x}",
        cli.mode,
        card.rca(),
        card.function_count(),
        card.io_ocr().into_u32()
    );

    match cli.command {
        Command::Init(args) => init(&mut host, args),
        Command::Read(args) => read(&mut host, args),
        Command::Write(args) => write(&mut host, args),
    }?;

    log::info!(
        "{} cycles, {} unknown samples, {} bus conflicts",
        sim.cycles(),
        host.unknown_samples(),
        sim.conflicts()
    );

    Ok(())
}

// ----------------------------------------------------------------------------
// Subcommands

fn init(host: &mut SimHost, args: InitArgs) -> Result<()> {
    if !args.dump {
        return Ok(());
    }

    let values = host.dump_cccr()?;
    for (reg, value) in CCCR_REGISTERS.iter().zip(values) {
        println!("{:#05x} {:<24} {value:#04x}", reg.offset, reg.name);
    }

    let info = host.card_info();
    if let Some((manufacturer, card)) = info.manufacturer {
        println!("manufacturer {manufacturer:#06x}, card {card:#06x}");
    }
    for function in &info.functions {
        println!(
            "{}: interface {:#x}, CIS {:#07x}, max block size {:?}",
            function.function, function.interface_code, function.cis_pointer, function.max_block_size
        );
    }

    Ok(())
}

fn prepare(host: &mut SimHost, args: &TransferArgs, len: usize) -> Result<FunctionNumber> {
    if len == 0 || len > 512 {
        bail!("transfers are 1 to 512 bytes, got {len}");
    }

    let function = FunctionNumber::try_from_u8(args.function)?;
    if function != FunctionNumber::Registers {
        host.enable_function(function)?;
    }
    host.set_bus_width(args.width.into())?;

    Ok(function)
}

fn read(host: &mut SimHost, args: ReadArgs) -> Result<()> {
    let function = prepare(host, &args.transfer, args.count as usize)?;

    let mut buf = vec![0u8; args.count as usize];
    host.cmd_io_rw_extended(
        function.into_u8(),
        args.transfer.address,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        args.count,
        TransferData::Read(&mut buf),
    )?;

    print_hex(args.transfer.address, &buf);
    Ok(())
}

fn write(host: &mut SimHost, args: WriteArgs) -> Result<()> {
    let HexData(data) = args.data;
    let function = prepare(host, &args.transfer, data.len())?;
    let count = data.len() as u16;

    host.cmd_io_rw_extended(
        function.into_u8(),
        args.transfer.address,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        count,
        TransferData::Write(&data),
    )?;

    let mut readback = vec![0u8; data.len()];
    host.cmd_io_rw_extended(
        function.into_u8(),
        args.transfer.address,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        count,
        TransferData::Read(&mut readback),
    )?;

    if readback != data {
        bail!("read back {readback:02x?}, expected {data:02x?}");
    }

    print_hex(args.transfer.address, &readback);
    Ok(())
}

fn print_hex(address: u32, data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:#07x}: {}", address as usize + i * 16, bytes.join(" "));
    }
}
