use wgpu::Device;

use pbrview::GpuError;

/// Collects validation errors raised by the device between `new` and `end`.
#[must_use = "All error scopes must end in a call to `end`"]
pub struct ValidationScope<'a> {
    device: &'a Device,
    label: &'a str,
}

impl<'a> ValidationScope<'a> {
    pub fn new(device: &'a Device, label: &'a str) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        Self { device, label }
    }

    pub fn end(self) -> Result<(), GpuError> {
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => {
                log::error!("{}: {}", self.label, error);
                Err(GpuError::Validation {
                    label: self.label.to_owned(),
                    message: error.to_string(),
                })
            }
            None => Ok(()),
        }
    }
}
