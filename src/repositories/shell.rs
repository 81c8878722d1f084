//! Shell access - shell-link files and shell verbs.

use crate::domain::{Result, ShortcutDescriptor};
use std::path::Path;

/// Reads and writes the property surface of `.lnk` files.
pub trait LinkStore {
    fn load(&self, path: &Path) -> Result<ShortcutDescriptor>;
    fn save(&self, path: &Path, descriptor: &ShortcutDescriptor) -> Result<()>;
}

/// The verbs the shell exposes for a file, e.g. "Pin to Start".
pub trait VerbProvider {
    /// Display names, including `&` accelerators, in shell order.
    fn verbs(&self, path: &Path) -> Result<Vec<String>>;
    /// Run the verb with exactly this display name. `Ok(false)` if the shell
    /// does not offer it.
    fn invoke(&self, path: &Path, verb: &str) -> Result<bool>;
}

impl<T: LinkStore + ?Sized> LinkStore for &T {
    fn load(&self, path: &Path) -> Result<ShortcutDescriptor> {
        (**self).load(path)
    }

    fn save(&self, path: &Path, descriptor: &ShortcutDescriptor) -> Result<()> {
        (**self).save(path, descriptor)
    }
}

impl<T: VerbProvider + ?Sized> VerbProvider for &T {
    fn verbs(&self, path: &Path) -> Result<Vec<String>> {
        (**self).verbs(path)
    }

    fn invoke(&self, path: &Path, verb: &str) -> Result<bool> {
        (**self).invoke(path, verb)
    }
}

#[cfg(windows)]
pub use native::{ComGuard, ShellLinkStore, ShellVerbs};

#[cfg(windows)]
mod native {
    use super::{LinkStore, VerbProvider};
    use crate::domain::{CasementError, IconLocation, Result, ShortcutDescriptor};
    use std::path::{Path, PathBuf};
    use tracing::{debug, trace};
    use windows::core::{Interface, BSTR, HSTRING, PROPVARIANT, VARIANT};
    use windows::Win32::Foundation::{RPC_E_CHANGED_MODE, TRUE};
    use windows::Win32::Storage::EnhancedStorage::PKEY_AppUserModel_ID;
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, IPersistFile,
        CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, STGM_READ, STGM_READWRITE,
    };
    use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PropVariantToStringAlloc};
    use windows::Win32::UI::Shell::{
        Folder, FolderItem, FolderItemVerbs, IShellDispatch, IShellLinkW, Shell, ShellLink,
    };

    const MAX_PATH_BUF: usize = 1024;
    const MAX_ARGS_BUF: usize = 8192;

    /// Initializes COM for the current thread; uninitializes on drop.
    pub struct ComGuard {
        owns: bool,
    }

    impl ComGuard {
        pub fn new() -> Result<Self> {
            let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
            if hr.is_ok() {
                Ok(Self { owns: true })
            } else if hr == RPC_E_CHANGED_MODE {
                // Already initialized as MTA by the host, usable as is.
                Ok(Self { owns: false })
            } else {
                Err(CasementError::Shell(format!("CoInitializeEx failed: {}", hr.message())))
            }
        }
    }

    impl Drop for ComGuard {
        fn drop(&mut self) {
            if self.owns {
                unsafe { CoUninitialize() };
            }
        }
    }

    fn wide_to_string(buf: &[u16]) -> String {
        let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }

    fn invalid(path: &Path, e: impl std::fmt::Display) -> CasementError {
        CasementError::InvalidShortcut {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }

    /// `IShellLinkW` + `IPropertyStore` over COM.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ShellLinkStore;

    impl ShellLinkStore {
        fn open(path: &Path, mode: windows::Win32::System::Com::STGM) -> Result<IShellLinkW> {
            let link: IShellLinkW = unsafe { CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)? };
            let persist: IPersistFile = link.cast()?;
            let wide = HSTRING::from(path.as_os_str());
            unsafe { persist.Load(&wide, mode) }.map_err(|e| invalid(path, e))?;
            Ok(link)
        }

        fn read_app_id(link: &IShellLinkW) -> Result<Option<String>> {
            let store: IPropertyStore = link.cast()?;
            unsafe {
                let value = store.GetValue(&PKEY_AppUserModel_ID)?;
                if value.is_empty() {
                    return Ok(None);
                }
                let text = PropVariantToStringAlloc(&value)?;
                let id = text.to_string().unwrap_or_default();
                CoTaskMemFree(Some(text.0 as *const _));
                Ok(if id.is_empty() { None } else { Some(id) })
            }
        }
    }

    impl LinkStore for ShellLinkStore {
        fn load(&self, path: &Path) -> Result<ShortcutDescriptor> {
            let _com = ComGuard::new()?;
            let link = Self::open(path, STGM_READ)?;
            trace!("Loaded shell link {}", path.display());

            let mut target = vec![0u16; MAX_PATH_BUF];
            let mut arguments = vec![0u16; MAX_ARGS_BUF];
            let mut working_dir = vec![0u16; MAX_PATH_BUF];
            let mut description = vec![0u16; MAX_PATH_BUF];
            let mut icon = vec![0u16; MAX_PATH_BUF];
            let mut icon_index = 0i32;

            unsafe {
                link.GetPath(&mut target, std::ptr::null_mut(), 0)
                    .map_err(|e| invalid(path, e))?;
                link.GetArguments(&mut arguments)?;
                link.GetWorkingDirectory(&mut working_dir)?;
                link.GetDescription(&mut description)?;
                link.GetIconLocation(&mut icon, &mut icon_index)?;
            }

            let working_dir = wide_to_string(&working_dir);
            let icon_path = wide_to_string(&icon);

            Ok(ShortcutDescriptor {
                target: PathBuf::from(wide_to_string(&target)),
                arguments: wide_to_string(&arguments),
                working_dir: (!working_dir.is_empty()).then(|| PathBuf::from(working_dir)),
                icon: (!icon_path.is_empty()).then(|| IconLocation::new(icon_path, icon_index)),
                description: wide_to_string(&description),
                app_id: Self::read_app_id(&link)?,
            })
        }

        fn save(&self, path: &Path, descriptor: &ShortcutDescriptor) -> Result<()> {
            let _com = ComGuard::new()?;
            let link: IShellLinkW = if path.exists() {
                Self::open(path, STGM_READWRITE)?
            } else {
                unsafe { CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)? }
            };

            unsafe {
                link.SetPath(&HSTRING::from(descriptor.target.as_os_str()))?;
                link.SetArguments(&HSTRING::from(descriptor.arguments.as_str()))?;
                let working_dir = descriptor
                    .working_dir
                    .as_deref()
                    .map(|p| HSTRING::from(p.as_os_str()))
                    .unwrap_or_default();
                link.SetWorkingDirectory(&working_dir)?;
                link.SetDescription(&HSTRING::from(descriptor.description.as_str()))?;
                match &descriptor.icon {
                    Some(icon) => {
                        link.SetIconLocation(&HSTRING::from(icon.path.as_os_str()), icon.index)?
                    }
                    None => link.SetIconLocation(&HSTRING::new(), 0)?,
                }

                let store: IPropertyStore = link.cast()?;
                let app_id = match &descriptor.app_id {
                    Some(id) => PROPVARIANT::from(id.as_str()),
                    None => PROPVARIANT::default(),
                };
                store.SetValue(&PKEY_AppUserModel_ID, &app_id)?;
                store.Commit()?;

                let persist: IPersistFile = link.cast()?;
                persist.Save(&HSTRING::from(path.as_os_str()), TRUE)?;
            }
            debug!("Saved shell link {}", path.display());
            Ok(())
        }
    }

    /// `Shell.Application` verb dispatch.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ShellVerbs;

    impl ShellVerbs {
        fn item_verbs(path: &Path) -> Result<FolderItemVerbs> {
            let (dir, name) = match (path.parent(), path.file_name()) {
                (Some(dir), Some(name)) => (dir, name),
                _ => return Err(CasementError::ShortcutNotFound(path.to_path_buf())),
            };
            unsafe {
                let shell: IShellDispatch = CoCreateInstance(&Shell, None, CLSCTX_INPROC_SERVER)?;
                let folder: Folder =
                    shell.NameSpace(&VARIANT::from(BSTR::from(dir.to_string_lossy().as_ref())))?;
                let item: FolderItem =
                    folder.ParseName(&BSTR::from(name.to_string_lossy().as_ref()))?;
                Ok(item.Verbs()?)
            }
        }
    }

    impl VerbProvider for ShellVerbs {
        fn verbs(&self, path: &Path) -> Result<Vec<String>> {
            let _com = ComGuard::new()?;
            let verbs = Self::item_verbs(path)?;
            let mut names = Vec::new();
            unsafe {
                for i in 0..verbs.Count()? {
                    let verb = verbs.Item(&VARIANT::from(i))?;
                    names.push(verb.Name()?.to_string());
                }
            }
            Ok(names)
        }

        fn invoke(&self, path: &Path, verb_name: &str) -> Result<bool> {
            let _com = ComGuard::new()?;
            let verbs = Self::item_verbs(path)?;
            unsafe {
                for i in 0..verbs.Count()? {
                    let verb = verbs.Item(&VARIANT::from(i))?;
                    if verb.Name()?.to_string() == verb_name {
                        debug!("Invoking \"{}\" on {}", verb_name, path.display());
                        verb.DoIt()?;
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
    }
}
