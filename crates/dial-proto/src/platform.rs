use std::path::PathBuf;

/// Which external player binary a discovered path refers to.  The flag set
/// passed at spawn time differs per binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Mpv,
    Ffplay,
}

impl PlayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerKind::Mpv => "mpv",
            PlayerKind::Ffplay => "ffplay",
        }
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/dialfm/
    // (avoid macOS Application Support folder for consistency)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("dialfm")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dialfm")
    }
}

pub fn data_dir() -> PathBuf {
    // XDG layout on unix; local app data on Windows.
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| std::env::temp_dir())
            .join(".local")
            .join("share")
            .join("dialfm")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dialfm")
    }
}

/// Directory where a previously fetched player binary may live.  Searched
/// after the bundled location but before PATH.
pub fn downloaded_bin_dir() -> PathBuf {
    data_dir().join("bin")
}

#[cfg(unix)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv"]
}

#[cfg(windows)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv.exe", "mpv"]
}

#[cfg(unix)]
fn ffplay_binary_names() -> &'static [&'static str] {
    &["ffplay"]
}

#[cfg(windows)]
fn ffplay_binary_names() -> &'static [&'static str] {
    &["ffplay.exe", "ffplay"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if is_executable(&p) {
            return Some(p);
        }
    }
    None
}

fn find_in_dir(dir: &PathBuf, names: &[&str]) -> Option<PathBuf> {
    for name in names {
        let p = dir.join(name);
        if is_executable(&p) {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    #[cfg(unix)]
    let sep = ":";
    #[cfg(windows)]
    let sep = ";";
    for dir in path.split(sep) {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

pub fn is_executable(path: &PathBuf) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if meta.is_dir() {
        return false;
    }
    if path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("exe"))
        .unwrap_or(false)
    {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(windows)]
    {
        false
    }
}

/// Find an external player binary.
///
/// Strict priority, first hit wins:
/// 1. mpv or ffplay bundled beside the current executable
/// 2. a previously fetched copy under the data dir (`bin/`)
/// 3. mpv on PATH
/// 4. ffplay on PATH
pub fn find_player_binary() -> Option<(PathBuf, PlayerKind)> {
    if let Some(p) = find_beside_exe(mpv_binary_names()) {
        return Some((p, PlayerKind::Mpv));
    }
    if let Some(p) = find_beside_exe(ffplay_binary_names()) {
        return Some((p, PlayerKind::Ffplay));
    }

    let downloaded = downloaded_bin_dir();
    if let Some(p) = find_in_dir(&downloaded, mpv_binary_names()) {
        return Some((p, PlayerKind::Mpv));
    }
    if let Some(p) = find_in_dir(&downloaded, ffplay_binary_names()) {
        return Some((p, PlayerKind::Ffplay));
    }

    if let Some(p) = find_on_path(mpv_binary_names()) {
        return Some((p, PlayerKind::Mpv));
    }
    if let Some(p) = find_on_path(ffplay_binary_names()) {
        return Some((p, PlayerKind::Ffplay));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn executable_detection() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();

        let plain = tmp.path().join("plain.txt");
        std::fs::write(&plain, b"data").unwrap();
        assert!(!is_executable(&plain));

        let script = tmp.path().join("run.sh");
        std::fs::write(&script, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&script));

        let exe = tmp.path().join("tool.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        assert!(is_executable(&exe));

        assert!(!is_executable(&tmp.path().to_path_buf()));
        assert!(!is_executable(&tmp.path().join("missing")));
    }

    #[test]
    fn config_dir_ends_with_app_name() {
        assert!(config_dir().ends_with("dialfm"));
    }

    #[test]
    fn downloaded_dir_under_data_dir() {
        assert!(downloaded_bin_dir().starts_with(data_dir()));
    }
}
