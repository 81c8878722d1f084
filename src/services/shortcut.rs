//! Shortcut service - editing `.lnk` files and pinning them.
//!
//! The shell never pins a shortcut directly. It pins a copy stored under the
//! user's `User Pinned` folder, so pinning means: make sure that copy exists,
//! then run the pin verb on the copy. The copy is a file of its own and
//! editing the source does not reach it; [`Shortcut::repin`] pushes edits
//! across.
//!
//! A file in the pin folder only counts as our copy when its name and its
//! link target both match the source. A same-named link to some other
//! program is stale and gets replaced before anything is pinned.

use super::finder::{same_target, SearchDir, ShortcutFinder};
use super::path::windows_normpath;
use crate::domain::{
    verb_matches, CasementError, IconLocation, PinTarget, PinnedShortcutState, Result,
    ShortcutDescriptor,
};
use crate::repositories::{LinkStore, VerbProvider};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, trace};

const PIN_STRUCTURE: [&str; 4] = ["Microsoft", "Internet Explorer", "Quick Launch", "User Pinned"];

// =============================================================================
// Pin locations
// =============================================================================

/// The current user's pinned-copy folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinLocations {
    app_data: PathBuf,
}

impl PinLocations {
    /// `app_data` is the roaming application data folder (`%APPDATA%`).
    pub fn new(app_data: impl Into<PathBuf>) -> Self {
        Self {
            app_data: app_data.into(),
        }
    }

    pub fn for_current_user() -> Result<Self> {
        dirs::data_dir()
            .map(Self::new)
            .ok_or_else(|| CasementError::FileSystem("no application data folder".into()))
    }

    pub fn app_data(&self) -> &Path {
        &self.app_data
    }

    /// `...\Quick Launch\User Pinned`.
    pub fn root(&self) -> PathBuf {
        PIN_STRUCTURE
            .iter()
            .fold(self.app_data.clone(), |path, part| path.join(part))
    }

    pub fn dir(&self, target: PinTarget) -> PathBuf {
        self.root().join(target.dir_name())
    }

    /// Which of our pin folders `path` (a folder or a `.lnk` inside one)
    /// points at, if any.
    ///
    /// Paths inside some other user's `User Pinned` folder are rejected with
    /// `ForeignPinDirectory`: the shell only pins for the current user.
    pub fn classify(&self, path: &Path) -> Result<Option<PinTarget>> {
        let mut normalized = normalize(path);
        if normalized.ends_with(".lnk") {
            if let Some(idx) = normalized.rfind('\\') {
                normalized.truncate(idx);
            }
        }

        if let Some(target) = PinTarget::ALL
            .into_iter()
            .find(|t| normalize(&self.dir(*t)) == normalized)
        {
            return Ok(Some(target));
        }

        let structure = PIN_STRUCTURE.join("\\").to_lowercase();
        if normalized.contains(&structure) && !normalized.starts_with(&normalize(&self.app_data)) {
            return Err(CasementError::ForeignPinDirectory(path.to_path_buf()));
        }
        Ok(None)
    }
}

fn normalize(path: &Path) -> String {
    windows_normpath(&path.to_string_lossy()).to_lowercase()
}

// =============================================================================
// Shell context
// =============================================================================

/// Everything a [`Shortcut`] needs from the outside world.
#[derive(Debug, Clone)]
pub struct Shell<L: LinkStore, V: VerbProvider> {
    links: L,
    verbs: V,
    pins: PinLocations,
}

impl<L: LinkStore, V: VerbProvider> Shell<L, V> {
    pub fn new(links: L, verbs: V, pins: PinLocations) -> Self {
        Self { links, verbs, pins }
    }

    pub fn links(&self) -> &L {
        &self.links
    }

    pub fn verbs(&self) -> &V {
        &self.verbs
    }

    pub fn pins(&self) -> &PinLocations {
        &self.pins
    }

    /// Load an existing shortcut.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Shortcut<'_, L, V>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CasementError::ShortcutNotFound(path.to_path_buf()));
        }
        let descriptor = self.links.load(path).map_err(|e| match e {
            CasementError::InvalidShortcut { .. } => e,
            other => CasementError::InvalidShortcut {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;
        trace!("Loaded {:?}", descriptor);
        Ok(Shortcut {
            shell: self,
            path: path.to_path_buf(),
            descriptor,
            modified: false,
        })
    }

    /// Write a new shortcut, replacing any file at `path`.
    #[instrument(skip(self, path, descriptor), fields(path = %path.as_ref().display()))]
    pub fn create(
        &self,
        path: impl AsRef<Path>,
        descriptor: ShortcutDescriptor,
    ) -> Result<Shortcut<'_, L, V>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.links.save(path, &descriptor)?;
        info!("Created shortcut to {}", descriptor.target.display());
        Ok(Shortcut {
            shell: self,
            path: path.to_path_buf(),
            descriptor,
            modified: false,
        })
    }
}

#[cfg(windows)]
impl Shell<crate::repositories::ShellLinkStore, crate::repositories::ShellVerbs> {
    /// The real shell, pinning for the current user.
    pub fn for_current_user() -> Result<Self> {
        Ok(Self::new(
            crate::repositories::ShellLinkStore,
            crate::repositories::ShellVerbs,
            PinLocations::for_current_user()?,
        ))
    }
}

// =============================================================================
// Shortcut
// =============================================================================

/// An opened `.lnk` file.
///
/// Setters only touch the in-memory descriptor; nothing reaches the disk
/// until [`Shortcut::save`].
#[derive(Debug)]
pub struct Shortcut<'s, L: LinkStore, V: VerbProvider> {
    shell: &'s Shell<L, V>,
    path: PathBuf,
    descriptor: ShortcutDescriptor,
    modified: bool,
}

impl<'s, L: LinkStore, V: VerbProvider> Shortcut<'s, L, V> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &ShortcutDescriptor {
        &self.descriptor
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn target(&self) -> &Path {
        &self.descriptor.target
    }

    pub fn set_target(&mut self, target: impl Into<PathBuf>) {
        self.descriptor.target = target.into();
        self.modified = true;
    }

    pub fn arguments(&self) -> &str {
        &self.descriptor.arguments
    }

    pub fn set_arguments(&mut self, arguments: impl Into<String>) {
        self.descriptor.arguments = arguments.into();
        self.modified = true;
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.descriptor.working_dir.as_deref()
    }

    pub fn set_working_dir(&mut self, dir: Option<PathBuf>) {
        self.descriptor.working_dir = dir;
        self.modified = true;
    }

    pub fn icon(&self) -> Option<&IconLocation> {
        self.descriptor.icon.as_ref()
    }

    pub fn set_icon(&mut self, icon: Option<IconLocation>) {
        self.descriptor.icon = icon;
        self.modified = true;
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.descriptor.description = description.into();
        self.modified = true;
    }

    /// `System.AppUserModel.ID`. Only new launches pick up a change.
    pub fn app_id(&self) -> Option<&str> {
        self.descriptor.app_id.as_deref()
    }

    pub fn set_app_id(&mut self, app_id: Option<String>) {
        self.descriptor.app_id = app_id;
        self.modified = true;
    }

    /// Write the descriptor back to the source file. Pinned copies are left
    /// as they are.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn save(&mut self) -> Result<()> {
        self.shell.links.save(&self.path, &self.descriptor)?;
        self.modified = false;
        debug!("Saved shortcut");
        Ok(())
    }

    /// Where the pinned copy for `target` lives and whether it is there now.
    ///
    /// `exists` needs a same-named link in the pin folder whose target is
    /// this shortcut's target. An unsaved target edit makes the copy count as
    /// missing until it is saved and pinned again.
    pub fn pin_state(&self, target: PinTarget) -> Result<PinnedShortcutState> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| CasementError::ShortcutNotFound(self.path.clone()))?;
        let dir = self.shell.pins.dir(target);
        let found = ShortcutFinder::new(vec![SearchDir::flat(&dir)])
            .find(&file_name.to_string_lossy())
            .next();

        Ok(match found {
            Some(path) => PinnedShortcutState {
                target,
                exists: self.is_copy_of_source(&path),
                path,
            },
            None => PinnedShortcutState {
                target,
                exists: false,
                path: dir.join(file_name),
            },
        })
    }

    fn is_copy_of_source(&self, copy: &Path) -> bool {
        match self.shell.links.load(copy) {
            Ok(descriptor) => same_target(&descriptor.target, self.target()),
            Err(e) => {
                trace!("Unreadable pinned copy {}: {}", copy.display(), e);
                false
            }
        }
    }

    /// True if a pinned copy exists and the shell offers to unpin it.
    pub fn is_pinned(&self, target: PinTarget) -> Result<bool> {
        let state = self.pin_state(target)?;
        if !state.exists {
            return Ok(false);
        }
        let verbs = self.shell.verbs.verbs(&state.path)?;
        Ok(find_verb(&verbs, target.unpin_verbs()).is_some())
    }

    /// Pin to `target`. The saved source file is what gets pinned; unsaved
    /// edits are not part of the copy.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn pin(&self, target: PinTarget) -> Result<PinnedShortcutState> {
        let state = self.ensure_pinned_copy(target)?;
        let verbs = self.shell.verbs.verbs(&state.path)?;

        if let Some(verb) = find_verb(&verbs, target.pin_verbs()) {
            self.invoke(&state.path, verb)?;
            info!("Pinned to the {}", target);
        } else if find_verb(&verbs, target.unpin_verbs()).is_some() {
            debug!("Already pinned to the {}", target);
        } else {
            return Err(unavailable(target.pin_verbs(), &state.path));
        }
        Ok(state)
    }

    /// Unpin from `target`. The pinned copy stays on disk.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn unpin(&self, target: PinTarget) -> Result<PinnedShortcutState> {
        let state = self.pin_state(target)?;
        if !state.exists {
            return Err(not_pinned(target, &state.path));
        }
        let verbs = self.shell.verbs.verbs(&state.path)?;

        if let Some(verb) = find_verb(&verbs, target.unpin_verbs()) {
            self.invoke(&state.path, verb)?;
            info!("Unpinned from the {}", target);
            Ok(state)
        } else if find_verb(&verbs, target.pin_verbs()).is_some() {
            Err(not_pinned(target, &state.path))
        } else {
            Err(unavailable(target.unpin_verbs(), &state.path))
        }
    }

    pub fn pin_to_start_menu(&self) -> Result<PinnedShortcutState> {
        self.pin(PinTarget::StartMenu)
    }

    pub fn pin_to_taskbar(&self) -> Result<PinnedShortcutState> {
        self.pin(PinTarget::Taskbar)
    }

    pub fn unpin_from_start_menu(&self) -> Result<PinnedShortcutState> {
        self.unpin(PinTarget::StartMenu)
    }

    pub fn unpin_from_taskbar(&self) -> Result<PinnedShortcutState> {
        self.unpin(PinTarget::Taskbar)
    }

    /// Replace the pinned copy with the current source file and pin it again.
    /// The pin moves to the end of the pinned items.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn repin(&self, target: PinTarget) -> Result<PinnedShortcutState> {
        self.require_source()?;
        let state = self.pin_state(target)?;
        if state.exists {
            if self.is_pinned(target)? {
                self.unpin(target)?;
            }
            if normalize(&self.path) != normalize(&state.path) {
                debug!("Refreshing pinned copy {}", state.path.display());
                fs::copy(&self.path, &state.path)?;
            }
        }
        self.pin(target)
    }

    /// Copy the source file to `destination`, a file or a folder.
    ///
    /// Copying into one of the current user's pin folders pins instead (see
    /// [`Shortcut::repin`]). Returns the path that now holds the shortcut.
    #[instrument(skip(self, destination), fields(path = %self.path.display()))]
    pub fn copy_to(&self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = destination.as_ref();
        self.require_source()?;
        if let Some(target) = self.shell.pins.classify(destination)? {
            return Ok(self.repin(target)?.path);
        }

        let destination = self.resolve_destination(destination);
        if destination.is_file() {
            debug!("Removing existing {}", destination.display());
            fs::remove_file(&destination)?;
        }
        debug!("Copying {} -> {}", self.path.display(), destination.display());
        fs::copy(&self.path, &destination)?;
        Ok(destination)
    }

    /// Move the source file to `destination`, a file or a folder.
    ///
    /// Moving into one of the current user's pin folders pins instead and
    /// leaves the source where it is.
    #[instrument(skip(self, destination), fields(path = %self.path.display()))]
    pub fn move_to(&mut self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = destination.as_ref();
        self.require_source()?;
        self.shell.pins.classify(&self.path)?;
        if let Some(target) = self.shell.pins.classify(destination)? {
            return Ok(self.repin(target)?.path);
        }

        let destination = self.resolve_destination(destination);
        if destination.is_file() {
            debug!("Removing existing {}", destination.display());
            fs::remove_file(&destination)?;
        }
        debug!("Renaming {} -> {}", self.path.display(), destination.display());
        fs::rename(&self.path, &destination)?;
        self.path = destination.clone();
        Ok(destination)
    }

    fn resolve_destination(&self, destination: &Path) -> PathBuf {
        match self.path.file_name() {
            Some(name) if destination.is_dir() => destination.join(name),
            _ => destination.to_path_buf(),
        }
    }

    fn require_source(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(CasementError::ShortcutNotFound(self.path.clone()))
        }
    }

    fn ensure_pinned_copy(&self, target: PinTarget) -> Result<PinnedShortcutState> {
        self.require_source()?;
        let mut state = self.pin_state(target)?;
        if state.exists {
            return Ok(state);
        }

        if state.path.is_file() {
            // same name, other program: never pin through it
            let verbs = self.shell.verbs.verbs(&state.path)?;
            if let Some(verb) = find_verb(&verbs, target.unpin_verbs()) {
                info!("Unpinning stale copy {}", state.path.display());
                self.invoke(&state.path, verb)?;
            }
            debug!("Replacing stale pinned copy {}", state.path.display());
        } else if let Some(parent) = state.path.parent() {
            fs::create_dir_all(parent)?;
            debug!("Creating pinned copy {}", state.path.display());
        }
        fs::copy(&self.path, &state.path)?;
        state.exists = true;
        Ok(state)
    }

    fn invoke(&self, path: &Path, verb: &str) -> Result<()> {
        debug!("Running verb \"{}\" on {}", verb, path.display());
        if self.shell.verbs.invoke(path, verb)? {
            Ok(())
        } else {
            Err(CasementError::PinVerbUnavailable {
                verb: verb.to_owned(),
                path: path.to_path_buf(),
            })
        }
    }
}

/// First verb the shell offers that matches one of the known spellings.
fn find_verb<'v>(offered: &'v [String], known: &[&str]) -> Option<&'v str> {
    offered
        .iter()
        .find(|verb| known.iter().any(|k| verb_matches(verb, k)))
        .map(String::as_str)
}

fn unavailable(known: &[&str], path: &Path) -> CasementError {
    CasementError::PinVerbUnavailable {
        verb: known.first().copied().unwrap_or_default().replace('&', ""),
        path: path.to_path_buf(),
    }
}

fn not_pinned(target: PinTarget, path: &Path) -> CasementError {
    CasementError::NotPinned {
        target: target.to_string(),
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_dirs() {
        let pins = PinLocations::new(r"C:\Users\alice\AppData\Roaming");
        let dir = normalize(&pins.dir(PinTarget::Taskbar));
        assert!(dir.ends_with(r"quick launch\user pinned\taskbar"));
    }

    #[test]
    fn test_classify() {
        let pins = PinLocations::new(r"C:\Users\alice\AppData\Roaming");
        let taskbar = pins.dir(PinTarget::Taskbar);
        assert_eq!(pins.classify(&taskbar).unwrap(), Some(PinTarget::Taskbar));
        assert_eq!(
            pins.classify(&pins.dir(PinTarget::StartMenu).join("App.lnk")).unwrap(),
            Some(PinTarget::StartMenu)
        );
        assert_eq!(pins.classify(Path::new(r"C:\Users\alice\Desktop")).unwrap(), None);

        let foreign = Path::new(
            r"C:\Users\bob\AppData\Roaming\Microsoft\Internet Explorer\Quick Launch\User Pinned\TaskBar",
        );
        assert_eq!(
            pins.classify(foreign).unwrap_err(),
            CasementError::ForeignPinDirectory(foreign.to_path_buf())
        );
    }

    #[test]
    fn test_find_verb_prefers_shell_order() {
        let offered = vec![
            "&Open".to_string(),
            "Pin to Start".to_string(),
            "Pin to tas&kbar".to_string(),
        ];
        assert_eq!(find_verb(&offered, PinTarget::StartMenu.pin_verbs()), Some("Pin to Start"));
        assert_eq!(
            find_verb(&offered, PinTarget::Taskbar.pin_verbs()),
            Some("Pin to tas&kbar")
        );
        assert_eq!(find_verb(&offered, PinTarget::StartMenu.unpin_verbs()), None);
    }
}
