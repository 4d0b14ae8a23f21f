/// Stable numeric codes surfaced to callers and used for CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    ValidationError = 3,
    ProviderNotRegistered = 20,
    NoProvidersAvailable = 21,
    AllProvidersFailed = 22,
    AllParallelRequestsFailed = 23,
    RecognitionFailed = 24,
    Timeout = 30,
    Cancelled = 31,
    NetworkError = 40,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
