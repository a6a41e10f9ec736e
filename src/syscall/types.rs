/// Stable system call numbers, passed in `a7`.
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallId {
    /// Give up the hart; the caller stays ready.
    Yield = 0,
    /// Sleep for `a0` ticks.
    Sleep = 1,
    /// Terminate the calling task.
    Exit = 2,
    /// Id of the calling task.
    TaskId = 3,
    /// Write `a1` bytes at `a0` to the console.
    Write = 4,
    /// Ticks since boot.
    Ticks = 5,
}

impl SyscallId {
    pub const ALL: [Self; 6] = [
        Self::Yield,
        Self::Sleep,
        Self::Exit,
        Self::TaskId,
        Self::Write,
        Self::Ticks,
    ];

    pub const fn number(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for SyscallId {
    type Error = SysError;

    fn try_from(number: u64) -> Result<Self, SysError> {
        Self::ALL
            .into_iter()
            .find(|id| id.number() == number)
            .ok_or(SysError::UnsupportedSyscall)
    }
}

/// Slots in the dispatch table. Numbers at or above this are a contract
/// violation.
pub const SYSCALL_TABLE_SIZE: usize = 8;

/// Unknown or unimplemented system call.
pub const ERR_UNSUPPORTED: i64 = -38;

/// Invalid argument combination for a known system call.
pub const ERR_INVALID_ARG: i64 = -22;

pub const ERR_NO_MEMORY: i64 = -12;

/// Resource temporarily exhausted; retrying later may succeed.
pub const ERR_AGAIN: i64 = -11;

/// Successful return for void-like calls.
pub const SYSCALL_OK: i64 = 0;

/// Caller-side view of a negative return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    UnsupportedSyscall,
    InvalidArgument,
    OutOfMemory,
    TryAgain,
    /// Any other negative value.
    Unknown(i64),
}

impl SysError {
    pub fn from_code(code: i64) -> Self {
        match code {
            ERR_UNSUPPORTED => Self::UnsupportedSyscall,
            ERR_INVALID_ARG => Self::InvalidArgument,
            ERR_NO_MEMORY => Self::OutOfMemory,
            ERR_AGAIN => Self::TryAgain,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::UnsupportedSyscall => ERR_UNSUPPORTED,
            Self::InvalidArgument => ERR_INVALID_ARG,
            Self::OutOfMemory => ERR_NO_MEMORY,
            Self::TryAgain => ERR_AGAIN,
            Self::Unknown(code) => code,
        }
    }
}

/// Decodes a raw `a0` return value into `Result`.
#[inline]
pub fn decode_result(raw: u64) -> Result<u64, SysError> {
    let signed = raw as i64;
    if signed < 0 {
        Err(SysError::from_code(signed))
    } else {
        Ok(raw)
    }
}
