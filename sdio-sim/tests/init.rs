use sdio_host::{
    Config,
    Error,
    Fault,
    FunctionNumber,
    InitSequence,
    InitStage,
    InitState,
    IoOcr,
    Mode,
};
use sdio_sim::{CardConfig, Faults, Simulation};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_sd_init_command_order() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();

    let card = host.sdio_init(false).unwrap();

    assert!(card.initialized());
    assert_eq!(card.rca(), 0x0001);
    assert_eq!(card.function_count(), 1);
    assert!(!card.memory_present());
    assert_eq!(card.io_ocr().into_u32(), 0x00ff_8000);

    let commands = sim.commands();
    assert_eq!(sim.command_indices(), [0, 5, 5, 3, 7]);
    assert_eq!(commands[1].argument, 0);
    assert_eq!(commands[2].argument, 0x00ff_8000);
    assert_eq!(commands[4].argument, 0x0001_0000);
    assert!(commands.iter().all(|c| !c.spi));

    assert!(sim.card().is_selected());
    assert_eq!(sim.conflicts(), 0);
    assert_eq!(host.unknown_samples(), 0);
}

#[test]
fn test_spi_init_skips_addressing() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Spi, Config::new()).unwrap();

    let card = host.sdio_init(false).unwrap();

    assert!(card.initialized());
    assert_eq!(card.rca(), 0);
    assert_eq!(sim.command_indices(), [0, 5, 5]);
    assert!(sim.card().is_spi());
    assert!(sim.card().is_ready());
    assert_eq!(sim.conflicts(), 0);
}

#[test]
fn test_slow_card_is_polled_until_ready() {
    init_logger();

    let sim = Simulation::new(CardConfig::new().with_ready_after(3));
    let config = Config::new().with_op_cond_poll(20);
    let mut host = sim.host(Mode::Sd, config).unwrap();

    host.sdio_init(false).unwrap();

    assert_eq!(sim.command_indices(), [0, 5, 5, 5, 5, 3, 7]);
    assert_eq!(sim.card().polls(), 3);
}

#[test]
fn test_negotiation_is_bounded() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    sim.set_faults(Faults {
        never_ready: true,
        ..Faults::new()
    });

    let config = Config::new()
        .with_op_cond_attempts(4)
        .with_op_cond_poll(10);
    let mut host = sim.host(Mode::Sd, config).unwrap();

    let err = host.sdio_init(false).unwrap_err();

    assert_eq!(err.stage, InitStage::Cmd5Negotiate);
    assert_eq!(err.reason, Error::CardNotReady);
    assert_eq!(sim.command_indices(), [0, 5, 5, 5, 5, 5]);
    assert!(!host.context().initialized());
}

#[test]
fn test_voltage_mismatch() {
    init_logger();

    let sim = Simulation::new(CardConfig::new().with_io_ocr(0x0000_0100));
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();

    let err = host.sdio_init(false).unwrap_err();

    assert_eq!(err.stage, InitStage::Cmd5Probe);
    assert_eq!(
        err.reason,
        Error::VoltageMismatch {
            card: 0x0000_0100,
            host: 0x00ff_8000,
        }
    );
    assert_eq!(sim.command_indices(), [0, 5]);
}

#[test]
fn test_unresponsive_card_fails_at_op_cond() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    sim.set_faults(Faults {
        ignore_commands: u32::MAX,
        ..Faults::new()
    });
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();

    let err = host.sdio_init(false).unwrap_err();

    assert_eq!(err.stage, InitStage::Cmd5Probe);
    assert_eq!(
        err.reason,
        Error::RetriesExhausted {
            attempts: 3,
            last: Fault::Timeout,
        }
    );
    // CMD0 has no response on the SD bus, so only CMD5 is retried
    assert_eq!(sim.command_indices(), [0, 5, 5, 5]);
    assert!(err.to_string().starts_with("initialization failed at CMD5-probe: "));
}

#[test]
fn test_stepwise_init() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();
    let mut sequence = InitSequence::new(false);

    let mut states = Vec::new();
    while !sequence.is_done() {
        states.push(sequence.step(&mut host).unwrap());
    }

    assert_eq!(
        states,
        [
            InitState::GoIdle,
            InitState::ProbeOpCond,
            InitState::NegotiateOpCond,
            InitState::SendRelativeAddr,
            InitState::SelectCard,
            InitState::Ready,
        ]
    );
    assert_eq!(sequence.polls(), 1);
    assert!(host.context().initialized());
}

#[test]
fn test_init_with_register_dump() {
    init_logger();

    let config = CardConfig::new()
        .with_functions(2)
        .with_manufacturer(0x1234, 0x5678)
        .with_max_block_size(256)
        .with_interface_code(0x07);
    let sim = Simulation::new(config);
    let mut host = sim.host(Mode::Sd, Config::new()).unwrap();

    let card = host.sdio_init(true).unwrap();
    assert_eq!(card.function_count(), 2);

    let info = host.card_info();
    assert_eq!(info.cccr_revision, 0x32);
    assert_eq!(info.sd_revision, 0x02);
    assert_eq!(info.cis_pointer, 0x1000);
    assert_eq!(info.manufacturer, Some((0x1234, 0x5678)));
    assert_eq!(info.max_block_size, Some(256));
    assert_eq!(info.functions.len(), 2);

    let f2 = info.function(FunctionNumber::Io2).unwrap();
    assert_eq!(f2.interface_code, 0x07);
    assert_eq!(f2.cis_pointer, 0x1200);
    assert_eq!(f2.max_block_size, Some(256));

    // CIS reads go through CMD53, register reads through CMD52
    let indices = sim.command_indices();
    assert!(indices.contains(&53));
    assert!(indices.iter().skip(5).all(|&i| i == 52 || i == 53));
}

#[test]
fn test_if_cond_is_optional() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Sd, Config::new().with_send_if_cond(true)).unwrap();
    host.sdio_init(false).unwrap();
    assert_eq!(sim.command_indices(), [0, 8, 8, 8, 5, 5, 3, 7]);
    // VHS 2.7-3.6V and the check pattern
    assert_eq!(sim.commands()[1].argument, 0x0000_01aa);

    let sim = Simulation::new(CardConfig::new().with_answer_if_cond(true));
    let mut host = sim.host(Mode::Sd, Config::new().with_send_if_cond(true)).unwrap();
    host.sdio_init(false).unwrap();
    assert_eq!(sim.command_indices(), [0, 8, 5, 5, 3, 7]);
}

#[test]
fn test_rca_changes_before_select() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Sd, Config::new().with_rca_changes(2)).unwrap();

    let card = host.sdio_init(false).unwrap();

    assert_eq!(sim.command_indices(), [0, 5, 5, 3, 3, 3, 7]);
    assert_eq!(card.rca(), 0x0003);
    assert_eq!(sim.commands()[6].argument, 0x0003_0000);
    assert_eq!(sim.card().rca(), 0x0003);
    assert!(sim.card().is_selected());
    assert_eq!(sim.conflicts(), 0);
}

#[test]
fn test_reinit_after_io_reset() {
    init_logger();

    let sim = Simulation::new(CardConfig::new());
    let mut host = sim.host(Mode::Sd, Config::new().with_io_reset(true)).unwrap();

    host.sdio_init(false).unwrap();
    // the card ignores CMD52 until it is selected
    assert_eq!(sim.command_indices()[..4], [52, 52, 52, 0]);

    host.soft_reset().unwrap();
    assert!(!host.context().initialized());

    let card = host.sdio_init(false).unwrap();
    assert!(card.initialized());
    assert_eq!(card.io_ocr(), IoOcr::from_u32(0x00ff_8000));
}
