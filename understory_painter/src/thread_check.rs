// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Debug-build check that a device is painted from the thread that owns it.
//!
//! This is a check, not a lock: release builds and `no_std` builds compile it
//! away.

use crate::engine::PaintDevice;
use crate::error::UsageError;

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct ThreadGuard {
    #[cfg(all(feature = "std", debug_assertions))]
    owner: Option<std::thread::ThreadId>,
}

impl ThreadGuard {
    #[cfg_attr(
        not(all(feature = "std", debug_assertions)),
        expect(unused_variables, reason = "the check is compiled out")
    )]
    pub(crate) fn for_device(device: &dyn PaintDevice, enabled: bool) -> Self {
        #[cfg(all(feature = "std", debug_assertions))]
        {
            let owner = if enabled && device.kind().has_thread_affinity() {
                device.owner_thread()
            } else {
                None
            };
            Self { owner }
        }
        #[cfg(not(all(feature = "std", debug_assertions)))]
        {
            Self {}
        }
    }

    pub(crate) fn check(&self) -> Result<(), UsageError> {
        #[cfg(all(feature = "std", debug_assertions))]
        if self
            .owner
            .is_some_and(|owner| owner != std::thread::current().id())
        {
            return Err(UsageError::WrongThread);
        }
        Ok(())
    }
}
