//! Device selection and health checks.

use crate::Result;
use crate::backend::Context;

/// Thin wrapper over a context's device control entry points.
#[derive(Clone, Debug)]
pub struct DeviceManager {
    ctx: Context,
}

impl DeviceManager {
    pub fn new(ctx: &Context) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub fn device_count(&self) -> Result<i32> {
        self.ctx.device_count()
    }

    /// Make `id` current, then verify the device is healthy.
    pub fn set_device(&self, id: i32) -> Result<()> {
        self.ctx.set_device(id)?;
        tracing::info!(backend = self.ctx.name(), id, "device selected");
        self.check_sanity()
    }

    pub fn best_device(&self) -> Result<i32> {
        self.ctx.best_device()
    }

    pub fn set_best_device(&self) -> Result<i32> {
        let id = self.best_device()?;
        self.set_device(id)?;
        Ok(id)
    }

    pub fn synchronize(&self) -> Result<()> {
        self.ctx.synchronize()
    }

    /// Block on outstanding work, then fail if the device reports an error.
    pub fn check_sanity(&self) -> Result<()> {
        self.ctx.synchronize()?;
        self.ctx.device_status()
    }
}
