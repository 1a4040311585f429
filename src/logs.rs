use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Returns the last `lines` lines of the log sink, or nothing if it does not exist.
pub fn tail_lines(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    if lines == 0 || !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut buffer: VecDeque<String> = VecDeque::with_capacity(lines);

    // Lines are decoded lossily; invalid UTF-8 must not end the tail early.
    for raw in reader.split(b'\n') {
        let mut raw = raw?;
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if buffer.len() == lines {
            buffer.pop_front();
        }
        buffer.push_back(String::from_utf8_lossy(&raw).into_owned());
    }

    Ok(buffer.into())
}

/// Reads and displays the last `lines` lines of the log sink.
///
/// # Returns
/// * `Ok(false)` if the log sink does not exist yet.
pub fn show_log(path: &Path, lines: usize) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    for line in tail_lines(path, lines)? {
        println!("{}", line);
    }

    Ok(true)
}
