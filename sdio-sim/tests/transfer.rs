use fugit::HertzU32;
use sdio_host::{
    Argument,
    BlockMode,
    BusWidth,
    Config,
    Error,
    FunctionNumber,
    Mode,
    OpCode,
    Response,
    TransferData,
    cccr,
    command::{RawFlag, RwFlag},
};
use sdio_sim::{CardConfig, SimHost, Simulation};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ready_host(sim: &Simulation, mode: Mode) -> SimHost {
    init_logger();

    let mut host = sim.host(mode, Config::new()).unwrap();
    host.sdio_init(false).unwrap();
    host
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(5)).collect()
}

#[test]
fn test_direct_write_then_read() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    let response = host
        .cmd_io_rw_direct(1, 0x100, RwFlag::Write, 0xab, RawFlag::WriteOnly)
        .unwrap();
    assert!(matches!(response, Response::R5(_)));

    let record = sim.commands().last().copied().unwrap();
    assert_eq!(record.index, 52);
    assert_eq!(record.argument, 0x9002_00ab);

    let response = host
        .cmd_io_rw_direct(1, 0x100, RwFlag::Read, 0, RawFlag::WriteOnly)
        .unwrap();
    assert_eq!(response.data(), Some(0xab));
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x100, 1), [0xab]);
}

#[test]
fn test_read_after_write_returns_register_value() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    // only the bus width bits of the interface control register are writable
    let readback = host
        .write_reg(FunctionNumber::Registers, cccr::BUS_INTERFACE, 0x03)
        .unwrap();
    assert_eq!(readback & cccr::BUS_WIDTH_MASK, 0x00);

    let revision = host.read_reg(FunctionNumber::Registers, cccr::REVISION).unwrap();
    assert_eq!(revision, 0x32);
}

#[test]
fn test_card_rejects_missing_function() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    let err = host
        .cmd_io_rw_direct(3, 0x0, RwFlag::Read, 0, RawFlag::WriteOnly)
        .unwrap_err();

    match err {
        Error::IoStatus(flags) => assert!(flags.function_number()),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_invalid_arguments_do_not_reach_the_card() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let sent = sim.commands().len();

    assert_eq!(
        host.cmd_io_rw_direct(8, 0, RwFlag::Read, 0, RawFlag::WriteOnly),
        Err(Error::invalid_argument(Argument::FunctionNumber(8)))
    );
    assert_eq!(
        host.cmd_io_rw_direct(1, 0x2_0000, RwFlag::Read, 0, RawFlag::WriteOnly),
        Err(Error::invalid_argument(Argument::RegisterAddress(0x2_0000)))
    );

    let mut buf = [0u8; 4];
    assert_eq!(
        host.cmd_io_rw_extended(
            1,
            0,
            BlockMode::Block,
            OpCode::IncrementingAddress,
            0,
            TransferData::Read(&mut buf),
        ),
        Err(Error::invalid_argument(Argument::BlockCount(0)))
    );

    assert_eq!(sim.commands().len(), sent);
}

#[test]
fn test_byte_mode_round_trip() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let data = pattern(16);

    host.cmd_io_rw_extended(
        1,
        0x40,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        16,
        TransferData::Write(&data),
    )
    .unwrap();
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x40, 16), data);

    let mut buf = [0u8; 16];
    host.cmd_io_rw_extended(
        1,
        0x40,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        16,
        TransferData::Read(&mut buf),
    )
    .unwrap();
    assert_eq!(buf.as_slice(), data.as_slice());
    assert_eq!(sim.conflicts(), 0);
}

#[test]
fn test_four_bit_block_round_trip() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    host.set_bus_width(BusWidth::Four).unwrap();
    host.set_clock_rate(HertzU32::MHz(25)).unwrap();
    host.set_block_size(FunctionNumber::Io1, 8).unwrap();

    assert_eq!(host.context().bus_width(), BusWidth::Four);
    assert_eq!(host.context().block_size(FunctionNumber::Io1), 8);
    assert_eq!(sim.card().memory().bus_width(), BusWidth::Four);
    assert_eq!(sim.card().memory().block_size(FunctionNumber::Io1), 8);

    let data = pattern(16);
    host.cmd_io_rw_extended(
        1,
        0x200,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        2,
        TransferData::Write(&data),
    )
    .unwrap();
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x200, 16), data);

    let mut buf = [0u8; 16];
    host.cmd_io_rw_extended(
        1,
        0x200,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        2,
        TransferData::Read(&mut buf),
    )
    .unwrap();
    assert_eq!(buf.as_slice(), data.as_slice());
    assert_eq!(sim.conflicts(), 0);
}

// Writes three 8-byte blocks and reads them back, returning the cycles taken by the read.
fn block_read_cycles(card: CardConfig, config: Config, width: BusWidth) -> u64 {
    init_logger();

    let sim = Simulation::new(card);
    let mut host = sim.host(Mode::Sd, config).unwrap();
    host.sdio_init(false).unwrap();
    host.set_bus_width(width).unwrap();
    host.set_block_size(FunctionNumber::Io1, 8).unwrap();

    let data = pattern(24);
    host.cmd_io_rw_extended(
        1,
        0x300,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        3,
        TransferData::Write(&data),
    )
    .unwrap();

    let start = sim.cycles();
    let mut buf = vec![0u8; 24];
    host.cmd_io_rw_extended(
        1,
        0x300,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        3,
        TransferData::Read(&mut buf),
    )
    .unwrap();
    let cycles = sim.cycles() - start;

    assert_eq!(buf, data);
    assert_eq!(sim.conflicts(), 0);
    cycles
}

#[test]
fn test_read_wait_holds_blocks() {
    let card = CardConfig::new().with_capabilities(CardConfig::CAPABILITIES | 0x04);

    for width in [BusWidth::One, BusWidth::Four] {
        let plain = block_read_cycles(card, Config::new(), width);
        let waited = block_read_cycles(card, Config::new().with_read_wait(16), width);

        // one 16 cycle pause before each block after the first
        assert!(waited >= plain + 32, "{width:?}: {waited} vs {plain}");
    }
}

#[test]
fn test_fixed_address_write_keeps_last_byte() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    host.cmd_io_rw_extended(
        1,
        0x10,
        BlockMode::Byte,
        OpCode::FixedAddress,
        4,
        TransferData::Write(&[1, 2, 3, 4]),
    )
    .unwrap();

    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x10, 2), [4, 0]);
}

#[test]
fn test_bus_width_rejected_by_one_bit_card() {
    let sim = Simulation::new(CardConfig::new().with_four_bit(false));
    let mut host = ready_host(&sim, Mode::Sd);

    assert_eq!(host.set_bus_width(BusWidth::Four), Err(Error::Unsupported));
    assert_eq!(host.context().bus_width(), BusWidth::One);
    assert_eq!(sim.card().memory().bus_width(), BusWidth::One);
}

#[test]
fn test_enable_and_disable_function() {
    let sim = Simulation::new(CardConfig::new().with_functions(2));
    let mut host = ready_host(&sim, Mode::Sd);

    host.enable_function(FunctionNumber::Io2).unwrap();
    let enables = host.read_reg(FunctionNumber::Registers, cccr::IO_ENABLE).unwrap();
    assert_eq!(enables, 0b100);

    host.disable_function(FunctionNumber::Io2).unwrap();
    let ready = host.read_reg(FunctionNumber::Registers, cccr::IO_READY).unwrap();
    assert_eq!(ready, 0);

    assert_eq!(
        host.enable_function(FunctionNumber::Registers),
        Err(Error::invalid_argument(Argument::FunctionNumber(0)))
    );
}

#[test]
fn test_spi_round_trip() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Spi);

    let response = host
        .cmd_io_rw_direct(1, 0x7, RwFlag::Write, 0x5a, RawFlag::ReadAfterWrite)
        .unwrap();
    assert!(matches!(response, Response::SpiR5(_)));
    assert_eq!(response.data(), Some(0x5a));

    host.set_block_size(FunctionNumber::Io1, 32).unwrap();

    let data = pattern(64);
    host.cmd_io_rw_extended(
        1,
        0x300,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        2,
        TransferData::Write(&data),
    )
    .unwrap();
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x300, 64), data);

    let mut buf = vec![0u8; 64];
    host.cmd_io_rw_extended(
        1,
        0x300,
        BlockMode::Block,
        OpCode::IncrementingAddress,
        2,
        TransferData::Read(&mut buf),
    )
    .unwrap();
    assert_eq!(buf, data);
    assert!(sim.commands().iter().all(|c| c.spi));
    assert_eq!(sim.conflicts(), 0);
}

#[test]
fn test_spi_bus_width_is_fixed() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Spi);

    assert!(host.set_bus_width(BusWidth::Four).is_err());
    assert_eq!(host.cmd_send_relative_addr(), Err(Error::Unsupported));
}
