//! Calling-convention facts for the two supported ABIs, chosen at build
//! time. Windows x64 passes arguments in (rcx, rdx, r8, r9) and requires a
//! 32-byte shadow area above rsp at every call; System V uses
//! (rdi, rsi, rdx, rcx) and has no shadow space.

#[cfg(windows)]
pub const ARG_REGS: [&str; 4] = ["rcx", "rdx", "r8", "r9"];
#[cfg(not(windows))]
pub const ARG_REGS: [&str; 4] = ["rdi", "rsi", "rdx", "rcx"];

/// Register for a fifth argument, when the ABI has one. Windows passes the
/// fifth argument on the stack instead.
#[cfg(windows)]
pub const FIFTH_ARG_REG: Option<&str> = None;
#[cfg(not(windows))]
pub const FIFTH_ARG_REG: Option<&str> = Some("r8");

/// Bytes the aligned-call sequence reserves below the aligned rsp. Layout:
///   Windows: [rsp+0..32) shadow, [rsp+32] fifth argument, [rsp+40] saved rsp
///   System V: [rsp+0] spare, [rsp+8] saved rsp
#[cfg(windows)]
pub const CALL_FRAME: usize = 48;
#[cfg(not(windows))]
pub const CALL_FRAME: usize = 16;

/// Offset of the saved original rsp inside the call frame.
#[cfg(windows)]
pub const SAVED_RSP_OFFSET: usize = 40;
#[cfg(not(windows))]
pub const SAVED_RSP_OFFSET: usize = 8;

/// Offset of the fifth argument slot (Windows only).
pub const STACK_ARG_OFFSET: usize = 32;
