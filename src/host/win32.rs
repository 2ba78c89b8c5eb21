//! Windows Bindings
//!
//! Registry and uptime through Win32, toasts through WinRT,
//! management-client and directory queries through PowerShell.

use super::powershell::{self, ldap_escape, quote};
use super::{
    client_service_registered, is_machine_account, Account, CatalogEntry, Directory, Hive, Host,
    ManagementClient, Notifier, Registry, Session,
};
use anyhow::{anyhow, bail, Result};
use chrono::{Duration, Local, NaiveDateTime};
use std::ffi::c_void;
use std::process::Command;
use windows::core::{HSTRING, PCWSTR, PWSTR};
use windows::Data::Xml::Dom::XmlDocument;
use windows::UI::Notifications::{ToastNotification, ToastNotificationManager};
use windows::Win32::Foundation::{CloseHandle, ERROR_SUCCESS, HANDLE};
use windows::Win32::Globalization::{GetUserPreferredUILanguages, MUI_LANGUAGE_NAME};
use windows::Win32::Security::{
    GetTokenInformation, IsWellKnownSid, TokenUser, WinLocalSystemSid, TOKEN_QUERY, TOKEN_USER,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, RegSetValueExW,
    HKEY, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE, REG_OPTION_NON_VOLATILE,
    REG_SZ, RRF_RT_ANY, RRF_RT_REG_DWORD, RRF_RT_REG_SZ,
};
use windows::Win32::System::SystemInformation::GetTickCount64;
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Longest registry key name (255 chars + NUL)
const MAX_KEY_LENGTH: usize = 256;

/// Binds every collaborator to this machine
pub fn host() -> Host {
    Host {
        registry: Box::new(WinRegistry),
        client: Box::new(CcmClient),
        directory: Box::new(AdsiDirectory),
        session: Box::new(LogonSession),
        notifier: Box::new(ToastPlatform),
    }
}

fn root(hive: Hive) -> HKEY {
    match hive {
        Hive::LocalMachine => HKEY_LOCAL_MACHINE,
        Hive::CurrentUser => HKEY_CURRENT_USER,
    }
}

/// Live registry
struct WinRegistry;

impl WinRegistry {
    /// Opens a key for reading; the caller closes it
    fn open(hive: Hive, path: &str) -> Option<HKEY> {
        let mut key = HKEY::default();
        let status = unsafe { RegOpenKeyExW(root(hive), &HSTRING::from(path), 0, KEY_READ, &mut key) };
        (status == ERROR_SUCCESS).then_some(key)
    }
}

impl Registry for WinRegistry {
    fn key_exists(&self, hive: Hive, path: &str) -> bool {
        match Self::open(hive, path) {
            Some(key) => {
                unsafe {
                    let _ = RegCloseKey(key);
                }
                true
            }
            None => false,
        }
    }

    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String> {
        let Some(key) = Self::open(hive, path) else {
            return Vec::new();
        };

        let mut names = Vec::new();
        let mut index = 0;
        loop {
            let mut buffer: Vec<u16> = vec![0; MAX_KEY_LENGTH];
            let mut len = buffer.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    key,
                    index,
                    PWSTR(buffer.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if status != ERROR_SUCCESS {
                break;
            }
            names.push(String::from_utf16_lossy(&buffer[..len as usize]));
            index += 1;
        }

        unsafe {
            let _ = RegCloseKey(key);
        }
        names
    }

    fn value_exists(&self, hive: Hive, path: &str, name: &str) -> bool {
        let status = unsafe {
            RegGetValueW(
                root(hive),
                &HSTRING::from(path),
                &HSTRING::from(name),
                RRF_RT_ANY,
                None,
                None,
                None,
            )
        };
        status == ERROR_SUCCESS
    }

    fn read_string(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
        let subkey = HSTRING::from(path);
        let value = HSTRING::from(name);

        // First call asks for the size in bytes
        let mut size: u32 = 0;
        let status = unsafe {
            RegGetValueW(root(hive), &subkey, &value, RRF_RT_REG_SZ, None, None, Some(&mut size))
        };
        if status != ERROR_SUCCESS || size == 0 {
            return None;
        }

        let mut buffer: Vec<u16> = vec![0; (size as usize).div_ceil(2)];
        let status = unsafe {
            RegGetValueW(
                root(hive),
                &subkey,
                &value,
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr() as *mut c_void),
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        Some(String::from_utf16_lossy(&buffer[..len]))
    }

    fn read_dword(&self, hive: Hive, path: &str, name: &str) -> Option<u32> {
        let mut data: u32 = 0;
        let mut size = std::mem::size_of::<u32>() as u32;
        let status = unsafe {
            RegGetValueW(
                root(hive),
                &HSTRING::from(path),
                &HSTRING::from(name),
                RRF_RT_REG_DWORD,
                None,
                Some(&mut data as *mut u32 as *mut c_void),
                Some(&mut size),
            )
        };
        (status == ERROR_SUCCESS).then_some(data)
    }

    fn write_string(&self, hive: Hive, path: &str, name: &str, value: &str) -> Result<()> {
        let mut key = HKEY::default();
        let status = unsafe {
            RegCreateKeyExW(
                root(hive),
                &HSTRING::from(path),
                0,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_WRITE,
                None,
                &mut key,
                None,
            )
        };
        if status != ERROR_SUCCESS {
            bail!("could not open {} for writing: {:?}", path, status);
        }

        // REG_SZ data is UTF-16 including the terminating NUL
        let wide: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
        let bytes: Vec<u8> = wide.iter().flat_map(|c| c.to_le_bytes()).collect();
        let status = unsafe { RegSetValueExW(key, &HSTRING::from(name), 0, REG_SZ, Some(&bytes)) };
        unsafe {
            let _ = RegCloseKey(key);
        }

        if status != ERROR_SUCCESS {
            bail!("could not write {}\\{}: {:?}", path, name, status);
        }
        Ok(())
    }
}

/// ConfigMgr client through its CIM classes
struct CcmClient;

impl ManagementClient for CcmClient {
    fn is_installed(&self) -> bool {
        client_service_registered(&WinRegistry)
    }

    fn reboot_pending(&self) -> Result<bool> {
        let value = powershell::run_json(
            "Invoke-CimMethod -Namespace 'root\\ccm\\ClientSDK' -ClassName CCM_ClientUtilities \
             -MethodName DetermineIfRebootPending | \
             Select-Object RebootPending,IsHardRebootPending | ConvertTo-Json -Compress",
        )?;
        let flag = |name: &str| value.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
        Ok(flag("RebootPending") || flag("IsHardRebootPending"))
    }

    fn programs(&self) -> Result<Vec<CatalogEntry>> {
        let value = powershell::run_json(
            "Get-CimInstance -Namespace 'root\\ccm\\ClientSDK' -ClassName CCM_Program | \
             Select-Object @{n='Id';e={$_.PackageID}},\
             @{n='Deadline';e={if ($_.Deadline) { $_.Deadline.ToString('yyyy-MM-ddTHH:mm:ss') }}} | \
             ConvertTo-Json -Compress",
        )?;
        Ok(powershell::parse_catalog(value))
    }

    fn applications(&self) -> Result<Vec<CatalogEntry>> {
        let value = powershell::run_json(
            "Get-CimInstance -Namespace 'root\\ccm\\ClientSDK' -ClassName CCM_Application | \
             Select-Object Id,\
             @{n='Deadline';e={if ($_.Deadline) { $_.Deadline.ToString('yyyy-MM-ddTHH:mm:ss') }}} | \
             ConvertTo-Json -Compress",
        )?;
        Ok(powershell::parse_catalog(value))
    }

    fn active_logon_sids(&self) -> Result<Vec<String>> {
        let value = powershell::run_json(
            "Get-CimInstance -Namespace 'root\\ccm' -ClassName CCM_UserLogonEvents \
             -Filter 'LogoffTime=null' | Select-Object UserSID | ConvertTo-Json -Compress",
        )?;
        Ok(powershell::parse_sids(value))
    }

    fn run_program(&self, package_id: &str) -> Result<()> {
        powershell::run(&format!(
            "$p = Get-CimInstance -Namespace 'root\\ccm\\ClientSDK' -ClassName CCM_Program | \
             Where-Object {{ $_.PackageID -eq {} }} | Select-Object -First 1; \
             if (-not $p) {{ throw 'package not deployed' }}; \
             Invoke-CimMethod -Namespace 'root\\ccm\\ClientSDK' -ClassName CCM_ProgramsManager \
             -MethodName ExecuteProgram -Arguments @{{ PackageID = $p.PackageID; ProgramID = $p.ProgramID }} | Out-Null",
            quote(package_id)
        ))?;
        Ok(())
    }

    fn open_application(&self, application_id: &str) -> Result<()> {
        powershell::run(&format!(
            "Start-Process {}",
            quote(&format!("softwarecenter:SoftwareID={}", application_id))
        ))?;
        Ok(())
    }
}

/// Active Directory through ADSI
struct AdsiDirectory;

impl Directory for AdsiDirectory {
    fn current_account(&self) -> Result<Account> {
        let value = powershell::run_json(
            "$r = ([adsisearcher]\"(&(objectCategory=User)(samaccountname=$env:USERNAME))\").FindOne(); \
             if ($r) { [pscustomobject]@{ Name = [string]$r.Properties['samaccountname'][0]; \
             Domain = [string]$env:USERDNSDOMAIN } | ConvertTo-Json -Compress }",
        )?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        match (field("Name"), field("Domain")) {
            (Some(name), Some(domain)) => Ok(Account { name, domain }),
            _ => Err(anyhow!("current user not found in the directory")),
        }
    }

    fn given_name(&self, account: &str, search_base: Option<&str>) -> Result<Option<String>> {
        let filter = format!(
            "(&(objectCategory=User)(samaccountname={}))",
            ldap_escape(account)
        );
        let scope = match search_base {
            Some(base) => format!("$s.SearchRoot = [adsi]({});", quote(&format!("LDAP://{}", base))),
            None => String::new(),
        };
        let value = powershell::run_json(&format!(
            "$s = [adsisearcher]{}; {} $r = $s.FindOne(); \
             if ($r) {{ [pscustomobject]@{{ GivenName = [string]$r.Properties['givenname'][0] }} | ConvertTo-Json -Compress }}",
            quote(&filter),
            scope
        ))?;
        Ok(value
            .get("GivenName")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    fn password_expiry_filetime(&self, account: &Account) -> Result<Option<i64>> {
        let filter = format!(
            "(&(objectCategory=User)(samaccountname={}))",
            ldap_escape(&account.name)
        );
        let value = powershell::run_json(&format!(
            "$s = [adsisearcher]{}; $s.SearchRoot = [adsi]{}; $r = $s.FindOne(); \
             if ($r) {{ $u = [adsi]$r.Path; $u.RefreshCache('msDS-UserPasswordExpiryTimeComputed'); \
             [pscustomobject]@{{ Raw = $u.ConvertLargeIntegerToInt64($u.Properties['msDS-UserPasswordExpiryTimeComputed'].Value) }} | \
             ConvertTo-Json -Compress }}",
            quote(&filter),
            quote(&format!("LDAP://{}", account.domain))
        ))?;
        Ok(value.get("Raw").and_then(|v| v.as_i64()))
    }
}

/// The interactive logon session of this process
struct LogonSession;

impl Session for LogonSession {
    fn user_name(&self) -> Option<String> {
        std::env::var("USERNAME").ok().filter(|name| !name.is_empty())
    }

    fn ui_language(&self) -> Option<String> {
        let mut count = 0u32;
        let mut len = 0u32;
        unsafe {
            GetUserPreferredUILanguages(MUI_LANGUAGE_NAME, &mut count, PWSTR::null(), &mut len)
                .ok()?;
        }
        if len == 0 {
            return None;
        }

        // Double-NUL terminated list, most preferred first
        let mut buffer: Vec<u16> = vec![0; len as usize];
        unsafe {
            GetUserPreferredUILanguages(
                MUI_LANGUAGE_NAME,
                &mut count,
                PWSTR(buffer.as_mut_ptr()),
                &mut len,
            )
            .ok()?;
        }
        buffer
            .split(|&c| c == 0)
            .next()
            .map(String::from_utf16_lossy)
            .filter(|name| !name.is_empty())
    }

    fn last_boot(&self) -> Option<NaiveDateTime> {
        let uptime_ms = unsafe { GetTickCount64() };
        let uptime = Duration::milliseconds(i64::try_from(uptime_ms).ok()?);
        Some(Local::now().naive_local() - uptime)
    }

    fn is_system_context(&self) -> bool {
        token_is_local_system()
            .unwrap_or_else(|| is_machine_account(self.user_name().as_deref()))
    }

    fn restart(&self) -> Result<()> {
        let status = Command::new("shutdown")
            .args(["/r", "/t", "0", "/d", "p:0:0", "/c", "Toast Notification Reboot"])
            .status()?;
        if !status.success() {
            bail!("shutdown exited with {}", status);
        }
        Ok(())
    }
}

/// Whether the process token is LocalSystem (S-1-5-18); `None` if unreadable
fn token_is_local_system() -> Option<bool> {
    unsafe {
        let mut token = HANDLE::default();
        OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).ok()?;

        let mut len = 0u32;
        let _ = GetTokenInformation(token, TokenUser, None, 0, &mut len);
        if len == 0 {
            let _ = CloseHandle(token);
            return None;
        }

        // u64 storage keeps TOKEN_USER aligned
        let mut buffer: Vec<u64> = vec![0; (len as usize).div_ceil(8)];
        let queried = GetTokenInformation(
            token,
            TokenUser,
            Some(buffer.as_mut_ptr() as *mut c_void),
            len,
            &mut len,
        );
        let _ = CloseHandle(token);
        queried.ok()?;

        let user = &*(buffer.as_ptr() as *const TOKEN_USER);
        Some(IsWellKnownSid(user.User.Sid, WinLocalSystemSid).as_bool())
    }
}

/// WinRT toast notifications
struct ToastPlatform;

impl Notifier for ToastPlatform {
    fn show(&self, app_id: &str, xml: &str) -> Result<()> {
        let document = XmlDocument::new()?;
        document.LoadXml(&HSTRING::from(xml))?;
        let toast = ToastNotification::CreateToastNotification(&document)?;
        ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(app_id))?.Show(&toast)?;
        Ok(())
    }

    fn speak(&self, text: &str) -> Result<()> {
        powershell::run(&format!(
            "Add-Type -AssemblyName System.Speech; \
             (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak({})",
            quote(text)
        ))?;
        Ok(())
    }
}
