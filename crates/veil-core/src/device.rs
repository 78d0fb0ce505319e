use std::fmt;

/// Compute device for tensor storage.
///
/// The whole pipeline is a single-threaded functional core over CPU memory;
/// batch parallelism happens inside ops, not across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host CPU
    #[default]
    Cpu,
}

impl Device {
    /// Whether this is a CPU device.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device() {
        assert!(Device::Cpu.is_cpu());
        assert_eq!(Device::default(), Device::Cpu);
        assert_eq!(format!("{}", Device::Cpu), "cpu");
    }
}
