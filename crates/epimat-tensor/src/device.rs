use std::fmt;

/// Execution context that owns a tensor's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory.
    #[default]
    Cpu,
    /// An accelerator, identified by ordinal.
    Accelerator(u32),
}

impl Device {
    pub fn is_host(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(ordinal) => write!(f, "accelerator:{}", ordinal),
        }
    }
}
