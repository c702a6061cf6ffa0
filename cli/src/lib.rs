pub mod commands;

use std::io::Write;

/// Blocking prompt + line read for the interactive shell.
pub fn readline() -> Result<String, String> {
    write!(std::io::stdout(), "emberlog> ").map_err(|e| e.to_string())?;
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut buffer = String::new();
    std::io::stdin()
        .read_line(&mut buffer)
        .map_err(|e| e.to_string())?;
    Ok(buffer)
}
