//! Command opcodes.
//!
//! Requests have odd opcodes; the opcode one above a request is its
//! acknowledgment or response.

/// Known PMU command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PmuCommand {
    Heartbeat = 0x01,
    HeartbeatAck = 0x02,
    HwVersionGet = 0x03,
    HwVersionGetAck = 0x04,
    FwVersionGet = 0x05,
    FwVersionGetAck = 0x06,
    StatusReport = 0x07,
    StatusReportAck = 0x08,
    DateTimeSync = 0x09,
    DateTimeSyncAck = 0x0A,
    ScheduleStartupTimeSet = 0x0B,
    ScheduleStartupTimeSetAck = 0x0C,
    PmuRequestShutdown = 0x0D,
    PmuRequestShutdownAck = 0x0E,
    HostRequestShutdown = 0x0F,
    HostRequestShutdownAck = 0x10,
    PmuRequestFactoryReset = 0x11,
    PmuRequestFactoryResetAck = 0x12,
    WatchdogTimeoutSet = 0x13,
    WatchdogTimeoutSetAck = 0x14,
    ChargerOnAutoStart = 0x15,
    ChargerOnAutoStartAck = 0x16,
    VoltageThresholdSet = 0x17,
    VoltageThresholdSetAck = 0x18,
    NetStatusLedSetup = 0x19,
    NetStatusLedSetupAck = 0x1A,
    PowerOnEventGet = 0x1B,
    PowerOnEventGetAck = 0x1C,
}

const ALL_COMMANDS: [PmuCommand; 28] = [
    PmuCommand::Heartbeat,
    PmuCommand::HeartbeatAck,
    PmuCommand::HwVersionGet,
    PmuCommand::HwVersionGetAck,
    PmuCommand::FwVersionGet,
    PmuCommand::FwVersionGetAck,
    PmuCommand::StatusReport,
    PmuCommand::StatusReportAck,
    PmuCommand::DateTimeSync,
    PmuCommand::DateTimeSyncAck,
    PmuCommand::ScheduleStartupTimeSet,
    PmuCommand::ScheduleStartupTimeSetAck,
    PmuCommand::PmuRequestShutdown,
    PmuCommand::PmuRequestShutdownAck,
    PmuCommand::HostRequestShutdown,
    PmuCommand::HostRequestShutdownAck,
    PmuCommand::PmuRequestFactoryReset,
    PmuCommand::PmuRequestFactoryResetAck,
    PmuCommand::WatchdogTimeoutSet,
    PmuCommand::WatchdogTimeoutSetAck,
    PmuCommand::ChargerOnAutoStart,
    PmuCommand::ChargerOnAutoStartAck,
    PmuCommand::VoltageThresholdSet,
    PmuCommand::VoltageThresholdSetAck,
    PmuCommand::NetStatusLedSetup,
    PmuCommand::NetStatusLedSetupAck,
    PmuCommand::PowerOnEventGet,
    PmuCommand::PowerOnEventGetAck,
];

impl PmuCommand {
    /// Raw opcode.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether this opcode is an acknowledgment/response.
    pub const fn is_ack(self) -> bool {
        self.code() % 2 == 0
    }

    /// Opcode the peer answers this request with.
    pub const fn ack(self) -> u16 {
        reply_command(self.code())
    }

    /// Protocol name of the opcode.
    pub const fn name(self) -> &'static str {
        match self {
            PmuCommand::Heartbeat => "HEARTBEAT",
            PmuCommand::HeartbeatAck => "HEARTBEAT_ACK",
            PmuCommand::HwVersionGet => "PMU_HW_VERSION_GET",
            PmuCommand::HwVersionGetAck => "PMU_HW_VERSION_GET_ACK",
            PmuCommand::FwVersionGet => "PMU_FW_VERSION_GET",
            PmuCommand::FwVersionGetAck => "PMU_FW_VERSION_GET_ACK",
            PmuCommand::StatusReport => "STATUS_REPORT",
            PmuCommand::StatusReportAck => "STATUS_REPORT_ACK",
            PmuCommand::DateTimeSync => "DATE_TIME_SYNC",
            PmuCommand::DateTimeSyncAck => "DATE_TIME_SYNC_ACK",
            PmuCommand::ScheduleStartupTimeSet => "SCHEDULE_STARTUP_TIME_SET",
            PmuCommand::ScheduleStartupTimeSetAck => "SCHEDULE_STARTUP_TIME_SET_ACK",
            PmuCommand::PmuRequestShutdown => "PMU_REQUEST_SHUTDOWN",
            PmuCommand::PmuRequestShutdownAck => "PMU_REQUEST_SHUTDOWN_ACK",
            PmuCommand::HostRequestShutdown => "HOST_REQUEST_SHUTDOWN",
            PmuCommand::HostRequestShutdownAck => "HOST_REQUEST_SHUTDOWN_ACK",
            PmuCommand::PmuRequestFactoryReset => "PMU_REQUEST_FACTORY_RESET",
            PmuCommand::PmuRequestFactoryResetAck => "PMU_REQUEST_FACTORY_RESET_ACK",
            PmuCommand::WatchdogTimeoutSet => "WATCHDOG_TIMEOUT_SET",
            PmuCommand::WatchdogTimeoutSetAck => "WATCHDOG_TIMEOUT_SET_ACK",
            PmuCommand::ChargerOnAutoStart => "CHARGER_ON_AUTO_START",
            PmuCommand::ChargerOnAutoStartAck => "CHARGER_ON_AUTO_START_ACK",
            PmuCommand::VoltageThresholdSet => "VOLTAGE_THRESHOLD_SET",
            PmuCommand::VoltageThresholdSetAck => "VOLTAGE_THRESHOLD_SET_ACK",
            PmuCommand::NetStatusLedSetup => "NET_STATUS_LED_SETUP",
            PmuCommand::NetStatusLedSetupAck => "NET_STATUS_LED_SETUP_ACK",
            PmuCommand::PowerOnEventGet => "POWER_ON_EVENT_GET",
            PmuCommand::PowerOnEventGetAck => "POWER_ON_EVENT_GET_ACK",
        }
    }
}

impl From<PmuCommand> for u16 {
    fn from(command: PmuCommand) -> Self {
        command.code()
    }
}

impl TryFrom<u16> for PmuCommand {
    type Error = u16;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        match code {
            0x01..=0x1C => Ok(ALL_COMMANDS[usize::from(code) - 1]),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for PmuCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply opcode for a request opcode.
pub const fn reply_command(command: u16) -> u16 {
    command.wrapping_add(1)
}

/// Name of a raw opcode, `"UNKNOWN"` for opcodes outside the known table.
pub fn command_name(code: u16) -> &'static str {
    PmuCommand::try_from(code)
        .map(PmuCommand::name)
        .unwrap_or("UNKNOWN")
}
