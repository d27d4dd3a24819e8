//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vesta_graphics::CommandRecorder;
use vesta_graphics::GpuDevice;
use vesta_graphics::backend::dummy::{DummyDevice, RecordedCommand};

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dummy device whose submissions complete immediately.
pub fn dummy_device() -> Arc<DummyDevice> {
    init_logger();
    Arc::new(DummyDevice::new())
}

/// Record into a fresh command buffer and return what was recorded.
pub fn record<F>(device: &DummyDevice, f: F) -> Vec<RecordedCommand>
where
    F: FnOnce(&mut dyn CommandRecorder),
{
    let command_buffer = device
        .allocate_command_buffer()
        .expect("dummy allocation cannot fail");
    {
        let mut recorder = device
            .begin_commands(command_buffer)
            .expect("begin recording");
        f(&mut *recorder);
    }
    device.end_commands(command_buffer).expect("end recording");
    device.commands(command_buffer)
}

/// Compact form of a command stream: labels by name, barriers as `|`.
pub fn trace(commands: &[RecordedCommand]) -> Vec<String> {
    commands
        .iter()
        .map(|command| match command {
            RecordedCommand::Label(label) => label.clone(),
            RecordedCommand::Barrier(_) => "|".to_string(),
            other => format!("{other:?}"),
        })
        .collect()
}
