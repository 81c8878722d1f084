//! Shortcut discovery in the usual shell folders.
//!
//! Besides the current user's folders, a finder can search every profile
//! below a mount point (`C:\` of this machine or another machine's disk).

use super::path::windows_normpath;
use super::shortcut::PinLocations;
use crate::domain::{CasementError, PinTarget, Result};
use crate::repositories::LinkStore;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

const ROAMING: [&str; 2] = ["AppData", "Roaming"];

/// A folder to search, optionally with everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDir {
    pub path: PathBuf,
    pub recursive: bool,
}

impl SearchDir {
    pub fn flat(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: false,
        }
    }

    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
        }
    }
}

/// Finds `.lnk` files by name or by target.
///
/// Every call rescans the folders. Results come out folder by folder in
/// priority order, sorted by file name within a folder, each path once.
/// Missing folders are skipped, and so is anything below an ignored path.
#[derive(Debug, Clone, Default)]
pub struct ShortcutFinder {
    dirs: Vec<SearchDir>,
    ignored: Vec<PathBuf>,
}

impl ShortcutFinder {
    pub fn new(dirs: Vec<SearchDir>) -> Self {
        Self {
            dirs,
            ignored: Vec::new(),
        }
    }

    /// Skip results at or below any of `ignored`.
    pub fn with_ignored(mut self, ignored: Vec<PathBuf>) -> Self {
        self.ignored = ignored;
        self
    }

    /// Search every profile below `root`, see
    /// [`ShortcutFinder::default_dirs_for_mount`].
    pub fn for_mount(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(Self::default_dirs_for_mount(root))
            .with_ignored(Self::default_ignored_for_mount(root))
    }

    /// Search the [`ShortcutFinder::default_dirs`].
    pub fn for_current_user() -> Self {
        Self::new(Self::default_dirs())
    }

    /// Most user-specific first: desktop, start menu programs, pinned
    /// taskbar and start menu items, public desktop, all-users programs.
    pub fn default_dirs() -> Vec<SearchDir> {
        let mut dirs = Vec::new();
        if let Some(desktop) = dirs::desktop_dir() {
            dirs.push(SearchDir::flat(desktop));
        }
        if let Some(app_data) = dirs::data_dir() {
            dirs.push(SearchDir::recursive(start_menu_programs(&app_data)));
            let pins = PinLocations::new(app_data);
            dirs.push(SearchDir::flat(pins.dir(PinTarget::Taskbar)));
            dirs.push(SearchDir::flat(pins.dir(PinTarget::StartMenu)));
        }
        if let Some(public) = std::env::var_os("PUBLIC") {
            dirs.push(SearchDir::flat(PathBuf::from(public).join("Desktop")));
        }
        if let Some(program_data) = std::env::var_os("ProgramData") {
            dirs.push(SearchDir::recursive(start_menu_programs(Path::new(
                &program_data,
            ))));
        }
        dirs
    }

    /// The folders [`ShortcutFinder::default_dirs`] covers, for every
    /// profile under `root\Users` instead of just the current user, then the
    /// all-users programs under `root\ProgramData`.
    ///
    /// Folders of one kind are grouped: all desktops, then all start menu
    /// programs, then pinned taskbar and start menu items. Profiles come in
    /// file name order. The pinned items of other users can be found but not
    /// pinned or unpinned.
    pub fn default_dirs_for_mount(root: &Path) -> Vec<SearchDir> {
        let ignored = Self::default_ignored_for_mount(root);
        let profiles: Vec<PathBuf> = WalkDir::new(root.join("Users"))
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_dir() && !is_below_any(p, &ignored))
            .collect();

        let mut dirs: Vec<SearchDir> = profiles
            .iter()
            .map(|p| SearchDir::flat(p.join("Desktop")))
            .collect();
        dirs.extend(
            profiles
                .iter()
                .map(|p| SearchDir::recursive(start_menu_programs(&roaming(p)))),
        );
        for target in [PinTarget::Taskbar, PinTarget::StartMenu] {
            dirs.extend(
                profiles
                    .iter()
                    .map(|p| SearchDir::flat(PinLocations::new(roaming(p)).dir(target))),
            );
        }
        dirs.push(SearchDir::recursive(start_menu_programs(
            &root.join("ProgramData"),
        )));
        dirs
    }

    /// `root\Users\All Users`, a link to `ProgramData` on current systems
    /// and a duplicate of it on Windows 7.
    pub fn default_ignored_for_mount(root: &Path) -> Vec<PathBuf> {
        vec![root.join("Users").join("All Users")]
    }

    pub fn dirs(&self) -> &[SearchDir] {
        &self.dirs
    }

    pub fn ignored(&self) -> &[PathBuf] {
        &self.ignored
    }

    /// Shortcuts whose file name equals `name`, ignoring case. `name` may
    /// leave off the `.lnk` extension.
    pub fn find<'a>(&'a self, name: &str) -> impl Iterator<Item = PathBuf> + 'a {
        let wanted = name.to_lowercase();
        let with_ext = if wanted.ends_with(".lnk") {
            wanted.clone()
        } else {
            format!("{wanted}.lnk")
        };
        self.scan(move |path| {
            file_name_lower(path).is_some_and(|n| n == wanted || n == with_ext)
        })
    }

    /// Shortcuts whose file name matches the glob `pattern`, ignoring case.
    ///
    /// `*` matches any run of characters, `?` one character and `[...]` one
    /// of a set (`[!...]` negates, `a-z` ranges). A `[` with no closing `]`
    /// is literal. Like [`ShortcutFinder::find`], the `.lnk` extension may be
    /// left off.
    pub fn find_glob<'a>(&'a self, pattern: &str) -> Result<impl Iterator<Item = PathBuf> + 'a> {
        let matcher = glob_regex(pattern)?;
        Ok(self.scan(move |path| {
            path.file_name()
                .is_some_and(|n| matcher.is_match(&n.to_string_lossy()))
        }))
    }

    /// Shortcuts whose link target is `target`, compared after Windows path
    /// normalization and ignoring case. Links that fail to load are skipped.
    pub fn find_by_target<'a, L: LinkStore>(
        &'a self,
        links: &'a L,
        target: &Path,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        let wanted = normalize_target(target);
        self.scan(move |path| match links.load(path) {
            Ok(descriptor) => normalize_target(&descriptor.target) == wanted,
            Err(e) => {
                trace!("Skipping {}: {}", path.display(), e);
                false
            }
        })
    }

    /// Every shortcut in the search folders.
    pub fn all(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.scan(|_| true)
    }

    fn scan<'a, F>(&'a self, matches: F) -> impl Iterator<Item = PathBuf> + 'a
    where
        F: Fn(&Path) -> bool + 'a,
    {
        let mut seen = HashSet::new();
        self.dirs
            .iter()
            .flat_map(|dir| list_links(dir))
            .filter(move |path| {
                let ignored = is_below_any(path, &self.ignored);
                if ignored {
                    trace!("Ignoring {}", path.display());
                }
                !ignored
            })
            .filter(move |path| matches(path.as_path()))
            .filter(move |path| seen.insert(normalize_target(path)))
    }
}

fn roaming(profile: &Path) -> PathBuf {
    ROAMING.iter().fold(profile.to_path_buf(), |path, part| path.join(part))
}

fn is_below_any(path: &Path, roots: &[PathBuf]) -> bool {
    let path = normalize_target(path);
    roots.iter().any(|root| {
        let root = normalize_target(root);
        path == root || path.starts_with(&format!("{}\\", root.trim_end_matches('\\')))
    })
}

/// Case-insensitive regex for a file name glob, `.lnk` optional.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?i)^(?:");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&glob_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }
    out.push_str(r")(?:\.lnk)?$");
    Regex::new(&out).map_err(|e| CasementError::InvalidPattern(format!("{}: {}", pattern, e)))
}

/// Index of the `]` closing the set opened at `start`. A `]` right after
/// `[` or `[!` belongs to the set.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i) == Some(&'!') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    (i..chars.len()).find(|&j| chars[j] == ']')
}

fn glob_class(body: &[char]) -> String {
    let (negate, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };
    let mut out = String::from(if negate { "[^" } else { "[" });
    for (idx, &c) in body.iter().enumerate() {
        if c == '-' && idx > 0 && idx + 1 < body.len() {
            out.push(c);
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }
    out.push(']');
    out
}

/// Same link target under Windows path rules, ignoring case.
pub(crate) fn same_target(a: &Path, b: &Path) -> bool {
    normalize_target(a) == normalize_target(b)
}

fn start_menu_programs(base: &Path) -> PathBuf {
    base.join("Microsoft")
        .join("Windows")
        .join("Start Menu")
        .join("Programs")
}

fn file_name_lower(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

fn normalize_target(path: &Path) -> String {
    windows_normpath(&path.to_string_lossy()).to_lowercase()
}

/// `.lnk` files of one folder, sorted by file name then path.
fn list_links(dir: &SearchDir) -> Vec<PathBuf> {
    if !dir.path.is_dir() {
        trace!("Skipping missing folder {}", dir.path.display());
        return Vec::new();
    }
    let depth = if dir.recursive { usize::MAX } else { 1 };
    let mut links: Vec<PathBuf> = WalkDir::new(&dir.path)
        .max_depth(depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("lnk"))
                .unwrap_or(false)
        })
        .collect();
    links.sort_by_cached_key(|p| (file_name_lower(p), p.clone()));
    links
}
