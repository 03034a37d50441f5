use sdio_host::{
    BlockMode,
    Config,
    Error,
    Fault,
    FunctionNumber,
    Mode,
    OpCode,
    TransferData,
    command::{RawFlag, RwFlag},
};
use sdio_sim::{CardConfig, Faults, SimHost, Simulation};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ready_host(sim: &Simulation, mode: Mode) -> SimHost {
    init_logger();

    let mut host = sim.host(mode, Config::new()).unwrap();
    host.sdio_init(false).unwrap();
    host
}

fn count_since(sim: &Simulation, start: usize, index: u8) -> usize {
    sim.commands()[start..]
        .iter()
        .filter(|c| c.index == index)
        .count()
}

fn write_16(host: &mut SimHost, data: &[u8]) -> Result<(), Error> {
    host.cmd_io_rw_extended(
        1,
        0x80,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        16,
        TransferData::Write(data),
    )
    .map(|_| ())
}

#[test]
fn test_unanswered_command_is_attempted_three_times() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let start = sim.commands().len();

    sim.set_faults(Faults {
        ignore_commands: u32::MAX,
        ..Faults::new()
    });

    let result = host.cmd_io_rw_direct(1, 0x0, RwFlag::Read, 0, RawFlag::WriteOnly);

    assert_eq!(
        result,
        Err(Error::RetriesExhausted {
            attempts: 3,
            last: Fault::Timeout,
        })
    );
    assert_eq!(count_since(&sim, start, 52), 3);
}

#[test]
fn test_attempts_follow_config() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim
        .host(Mode::Sd, Config::new().with_command_attempts(5))
        .unwrap();
    host.sdio_init(false).unwrap();
    let start = sim.commands().len();

    sim.set_faults(Faults {
        ignore_commands: u32::MAX,
        ..Faults::new()
    });

    let err = host.read_reg(FunctionNumber::Registers, 0x00).unwrap_err();
    assert_eq!(
        err,
        Error::RetriesExhausted {
            attempts: 5,
            last: Fault::Timeout,
        }
    );
    assert_eq!(count_since(&sim, start, 52), 5);
}

#[test]
fn test_corrupted_response_is_retried() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let start = sim.commands().len();

    sim.set_faults(Faults {
        corrupt_responses: 1,
        ..Faults::new()
    });

    let revision = host.read_reg(FunctionNumber::Registers, 0x00).unwrap();

    assert_eq!(revision, 0x32);
    assert_eq!(count_since(&sim, start, 52), 2);
    assert_eq!(sim.faults(), Faults::new());
}

#[test]
fn test_persistent_response_corruption_gives_up() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    sim.set_faults(Faults {
        corrupt_responses: 10,
        ..Faults::new()
    });

    assert_eq!(
        host.read_reg(FunctionNumber::Registers, 0x00),
        Err(Error::RetriesExhausted {
            attempts: 3,
            last: Fault::Crc,
        })
    );
    assert_eq!(sim.faults().corrupt_responses, 7);
}

#[test]
fn test_rejected_write_is_resent() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let start = sim.commands().len();
    let data: Vec<u8> = (0..16).collect();

    sim.set_faults(Faults {
        reject_writes: 1,
        ..Faults::new()
    });

    write_16(&mut host, &data).unwrap();

    assert_eq!(count_since(&sim, start, 53), 2);
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x80, 16), data);
}

#[test]
fn test_persistently_rejected_write_leaves_memory_untouched() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);

    sim.set_faults(Faults {
        reject_writes: u32::MAX,
        ..Faults::new()
    });

    assert_eq!(
        write_16(&mut host, &[0xff; 16]),
        Err(Error::RetriesExhausted {
            attempts: 3,
            last: Fault::Crc,
        })
    );
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x80, 16), [0; 16]);
}

#[test]
fn test_spi_rejected_write_is_resent() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Spi);
    let start = sim.commands().len();
    let data = [0x5a; 16];

    sim.set_faults(Faults {
        reject_writes: 2,
        ..Faults::new()
    });

    write_16(&mut host, &data).unwrap();

    assert_eq!(count_since(&sim, start, 53), 3);
    assert_eq!(sim.card().memory().peek(FunctionNumber::Io1, 0x80, 16), data);
}

#[test]
fn test_corrupted_read_block_is_read_again() {
    let sim = Simulation::new(CardConfig::new());
    let mut host = ready_host(&sim, Mode::Sd);
    let data: Vec<u8> = (100..116).collect();

    write_16(&mut host, &data).unwrap();
    let start = sim.commands().len();

    sim.set_faults(Faults {
        corrupt_read_blocks: 1,
        ..Faults::new()
    });

    let mut buf = [0u8; 16];
    host.cmd_io_rw_extended(
        1,
        0x80,
        BlockMode::Byte,
        OpCode::IncrementingAddress,
        16,
        TransferData::Read(&mut buf),
    )
    .unwrap();

    assert_eq!(buf.as_slice(), data.as_slice());
    assert_eq!(count_since(&sim, start, 53), 2);
}

#[test]
fn test_unknown_turnaround_is_tolerated() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    sim.set_faults(Faults {
        turnaround_unknown: 2,
        ..Faults::new()
    });
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();

    let card = host.sdio_init(false).unwrap();
    assert!(card.initialized());

    let value = host.read_reg(FunctionNumber::Registers, 0x00).unwrap();
    assert_eq!(value, 0x32);

    assert!(host.unknown_samples() > 0);
    assert_eq!(sim.conflicts(), 0);
}

#[test]
fn test_spi_lost_reset_is_resent() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    sim.set_faults(Faults {
        ignore_commands: 1,
        ..Faults::new()
    });
    let mut host = sim.host(Mode::Spi, Config::new()).unwrap();

    host.sdio_init(false).unwrap();

    assert_eq!(sim.command_indices(), [0, 0, 5, 5]);
}
