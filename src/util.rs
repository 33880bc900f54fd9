use std::path::PathBuf;

pub const DEFAULT_SSH_PORT: u16 = 22;

pub const DEFAULT_CPU_THRESHOLD: u8 = 80;

pub const DEFAULT_MEMORY_THRESHOLD: u8 = 85;

pub const DEFAULT_DISK_THRESHOLD: u8 = 90;

pub fn get_default_port() -> u16 {
    DEFAULT_SSH_PORT
}

pub fn get_default_cpu_threshold() -> u8 {
    DEFAULT_CPU_THRESHOLD
}

pub fn get_default_memory_threshold() -> u8 {
    DEFAULT_MEMORY_THRESHOLD
}

pub fn get_default_disk_threshold() -> u8 {
    DEFAULT_DISK_THRESHOLD
}

const DATABASE_PATH: &str = "DATABASE_PATH";

/// Database path override from the environment, if set and non-empty
pub fn get_database_path() -> Option<PathBuf> {
    std::env::var(DATABASE_PATH)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

/// Round to one decimal, the precision viewers get for averages
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
