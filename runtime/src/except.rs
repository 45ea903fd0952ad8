//! Try/catch support.
//!
//! The exception stack is a thread-local list of ten-slot register save
//! areas filled by the emitted `stola_setjmp`. `throw` stores the value in
//! the thread-local error slot, pops the top frame and longjmps into it
//! through the pointer the generated main registered at startup.
//! Exceptions never cross threads; an unhandled throw terminates the
//! process.

use std::cell::{Cell, RefCell};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::value::{text_of, Value};

/// (rbx, rbp, r12, r13, r14, r15, rsi, rdi, rsp, return address)
type TryFrame = [u64; 10];

type LongjmpFn = extern "C" fn(*mut u64, i64) -> !;

static LONGJMP: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static TRY_STACK: RefCell<Vec<*mut TryFrame>> = const { RefCell::new(Vec::new()) };
    static CURRENT_ERROR: Cell<*mut Value> = const { Cell::new(std::ptr::null_mut()) };
}

#[no_mangle]
pub extern "C" fn register_longjmp(code: *const std::ffi::c_void) {
    LONGJMP.store(code as usize, Ordering::SeqCst);
}

/// Push a fresh try frame and hand it to the generated code, which fills
/// it via `stola_setjmp`.
#[no_mangle]
pub extern "C" fn push_try() -> *mut u64 {
    let frame: *mut TryFrame = Box::into_raw(Box::new([0u64; 10]));
    TRY_STACK.with(|stack| stack.borrow_mut().push(frame));
    frame as *mut u64
}

/// Normal exit from a try block discards its frame. Calls must match
/// `push_try` one to one.
#[no_mangle]
pub extern "C" fn pop_try() {
    TRY_STACK.with(|stack| stack.borrow_mut().pop());
}

#[no_mangle]
pub extern "C" fn get_error() -> *mut Value {
    CURRENT_ERROR.with(|error| error.get())
}

#[no_mangle]
pub extern "C" fn throw(value: *mut Value) -> ! {
    CURRENT_ERROR.with(|error| error.set(value));

    let frame = TRY_STACK.with(|stack| stack.borrow_mut().pop());
    match frame {
        Some(frame) => {
            let code = LONGJMP.load(Ordering::SeqCst);
            if code == 0 {
                eprintln!("[FATAL] throw before longjmp registration");
                process::exit(1);
            }
            let longjmp: LongjmpFn = unsafe { std::mem::transmute(code) };
            longjmp(frame as *mut u64, 1)
        }
        None => {
            eprintln!("[FATAL] Unhandled exception: {}", text_of(value));
            process::exit(1);
        }
    }
}
