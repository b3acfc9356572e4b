#![cfg_attr(not(test), no_std)]

use core::fmt::{self, Write};

use spin::Mutex;

/// Byte sink the log macros write to, usually a UART or a semihosting channel.
pub trait ConsoleWrite: Send + Sync {
    fn write(&self, s: &str);
}

struct Console {
    console: Option<&'static dyn ConsoleWrite>,
}

static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

impl Console {
    const fn new() -> Self {
        Self { console: None }
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = self.console {
            console.write(s);
        }
        Ok(())
    }
}

/// Install the sink for all subsequent output. Output produced before a console
/// is installed is dropped.
pub fn set_console(console: &'static dyn ConsoleWrite) {
    CONSOLE.lock().console.replace(console);
}

pub fn take_console() -> Option<&'static dyn ConsoleWrite> {
    CONSOLE.lock().console.take()
}

#[doc(hidden)]
pub fn do_print(args: fmt::Arguments) {
    let _ = CONSOLE.lock().write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::do_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_warn {
    ($($arg:tt)*) => {
        $crate::println!("[fiber: warn] {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_debug {
    ($($arg:tt)*) => {
        $crate::println!("[fiber:debug] {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_info {
    ($($arg:tt)*) => {
        $crate::println!("[fiber: info] {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_fatal {
    () => {
        $crate::println!("[fiber:fatal] ")
    };
    ($($arg:tt)*) => {
        $crate::println!("[fiber:fatal] {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_trace {
    ($feat:literal) => {
        #[deny(unexpected_cfgs)]
        {
            #[cfg(feature = $feat)]
            $crate::println!("[fiber:trace] ")
        }
    };
    ($feat:literal, $($arg:tt)*) => {{
        #[deny(unexpected_cfgs)]
        {
            #[cfg(feature = $feat)]
            $crate::println!("[fiber:trace] {}", format_args!($($arg)*))
        }
    }};
}
