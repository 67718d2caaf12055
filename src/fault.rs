//! Top-level fault capture for the service loop
//!
//! A panic while handling one event is logged into the debug log and the
//! loop keeps running.

use crate::display::SurfaceFactory;
use crate::orchestrator::Orchestrator;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

static LAST_BACKTRACE: Mutex<Option<String>> = Mutex::new(None);

/// Chain a hook that stashes the backtrace of the most recent panic
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if let Ok(mut slot) = LAST_BACKTRACE.lock() {
            *slot = Some(Backtrace::force_capture().to_string());
        }
        default_hook(info);
    }));
}

fn take_backtrace() -> Option<String> {
    LAST_BACKTRACE.lock().ok().and_then(|mut slot| slot.take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f` against the core, recording a fault instead of unwinding further
pub fn guarded<F, R>(
    core: &mut Orchestrator<F>,
    f: impl FnOnce(&mut Orchestrator<F>) -> R,
) -> Option<R>
where
    F: SurfaceFactory,
{
    match panic::catch_unwind(AssertUnwindSafe(|| f(core))) {
        Ok(result) => Some(result),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            core.record_fault(&message, take_backtrace());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleLauncher;
    use crate::debug_log::LogKind;
    use crate::display::testing::FakeFactory;
    use crate::settings::Settings;

    fn core() -> Orchestrator<FakeFactory> {
        Orchestrator::new(
            FakeFactory::default(),
            Settings::default(),
            ConsoleLauncher::disabled(),
        )
    }

    #[test]
    fn test_guarded_passes_result_through() {
        let mut core = core();
        assert_eq!(guarded(&mut core, |core| core.surface_count()), Some(0));
    }

    #[test]
    fn test_panic_is_recorded_and_core_survives() {
        let mut core = core();
        let result: Option<()> = guarded(&mut core, |_| panic!("handler exploded"));
        assert!(result.is_none());

        let entry = &core.debug_logs()[0];
        assert_eq!(entry.kind, LogKind::Error);
        assert_eq!(entry.message, "Core fault");
        assert_eq!(entry.data.as_ref().unwrap()["message"], "handler exploded");

        assert!(core.request_trigger(true).accepted);
    }

    #[test]
    fn test_formatted_panic_message() {
        let mut core = core();
        let _: Option<()> = guarded(&mut core, |_| panic!("bad display {}", 7));
        let entry = &core.debug_logs()[0];
        assert_eq!(entry.data.as_ref().unwrap()["message"], "bad display 7");
    }
}
