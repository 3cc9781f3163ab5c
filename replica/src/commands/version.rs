/// Get the version string for replica and libreplica
pub fn get_version_string() -> String {
    format!(
        "replica {}\nlibreplica {}",
        env!("CARGO_PKG_VERSION"),
        libreplica::version()
    )
}

/// Print version information to stdout
pub fn print_version() {
    println!("{}", get_version_string());
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
