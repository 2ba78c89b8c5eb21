//! In-memory collaborators for tests

use super::{
    Account, CatalogEntry, Directory, Hive, Host, ManagementClient, Notifier, Registry, Session,
};
use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Text(String),
    Dword(u32),
}

type Key = (Hive, String);

/// Registry tree keyed by (hive, path)
#[derive(Debug, Default)]
pub struct FakeRegistry {
    keys: RefCell<BTreeMap<Key, BTreeMap<String, Value>>>,
}

impl FakeRegistry {
    pub fn with_key(self, hive: Hive, path: &str) -> Self {
        self.keys
            .borrow_mut()
            .entry((hive, path.to_string()))
            .or_default();
        self
    }

    pub fn with_string(self, hive: Hive, path: &str, name: &str, value: &str) -> Self {
        self.insert(hive, path, name, Value::Text(value.to_string()));
        self
    }

    pub fn with_dword(self, hive: Hive, path: &str, name: &str, value: u32) -> Self {
        self.insert(hive, path, name, Value::Dword(value));
        self
    }

    fn insert(&self, hive: Hive, path: &str, name: &str, value: Value) {
        self.keys
            .borrow_mut()
            .entry((hive, path.to_string()))
            .or_default()
            .insert(name.to_string(), value);
    }

    fn value(&self, hive: Hive, path: &str, name: &str) -> Option<Value> {
        self.keys
            .borrow()
            .get(&(hive, path.to_string()))
            .and_then(|values| values.get(name).cloned())
    }
}

impl Registry for FakeRegistry {
    fn key_exists(&self, hive: Hive, path: &str) -> bool {
        self.keys.borrow().contains_key(&(hive, path.to_string()))
    }

    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String> {
        let prefix = format!("{}\\", path);
        let mut names: Vec<String> = self
            .keys
            .borrow()
            .keys()
            .filter(|(h, p)| *h == hive && p.starts_with(&prefix))
            .filter_map(|(_, p)| p[prefix.len()..].split('\\').next().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn value_exists(&self, hive: Hive, path: &str, name: &str) -> bool {
        self.value(hive, path, name).is_some()
    }

    fn read_string(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
        match self.value(hive, path, name)? {
            Value::Text(text) => Some(text),
            Value::Dword(_) => None,
        }
    }

    fn read_dword(&self, hive: Hive, path: &str, name: &str) -> Option<u32> {
        match self.value(hive, path, name)? {
            Value::Dword(number) => Some(number),
            Value::Text(_) => None,
        }
    }

    fn write_string(&self, hive: Hive, path: &str, name: &str, value: &str) -> Result<()> {
        self.insert(hive, path, name, Value::Text(value.to_string()));
        Ok(())
    }
}

/// Shared view on a registry handed to a `Host`
#[derive(Debug, Default, Clone)]
pub struct SharedRegistry(pub Rc<FakeRegistry>);

impl Registry for SharedRegistry {
    fn key_exists(&self, hive: Hive, path: &str) -> bool {
        self.0.key_exists(hive, path)
    }
    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String> {
        self.0.subkeys(hive, path)
    }
    fn value_exists(&self, hive: Hive, path: &str, name: &str) -> bool {
        self.0.value_exists(hive, path, name)
    }
    fn read_string(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
        self.0.read_string(hive, path, name)
    }
    fn read_dword(&self, hive: Hive, path: &str, name: &str) -> Option<u32> {
        self.0.read_dword(hive, path, name)
    }
    fn write_string(&self, hive: Hive, path: &str, name: &str, value: &str) -> Result<()> {
        self.0.write_string(hive, path, name, value)
    }
}

/// Management client; `None` results fail the query
#[derive(Debug, Default, Clone)]
pub struct FakeClient {
    pub installed: bool,
    pub reboot_pending: Option<bool>,
    pub programs: Option<Vec<CatalogEntry>>,
    pub applications: Option<Vec<CatalogEntry>>,
    pub logon_sids: Option<Vec<String>>,
    /// `program:<id>` / `application:<id>` per launch
    pub launched: Rc<RefCell<Vec<String>>>,
}

impl ManagementClient for FakeClient {
    fn is_installed(&self) -> bool {
        self.installed
    }

    fn reboot_pending(&self) -> Result<bool> {
        self.reboot_pending
            .ok_or_else(|| anyhow!("DetermineIfRebootPending failed"))
    }

    fn programs(&self) -> Result<Vec<CatalogEntry>> {
        self.programs.clone().ok_or_else(|| anyhow!("CCM_Program query failed"))
    }

    fn applications(&self) -> Result<Vec<CatalogEntry>> {
        self.applications
            .clone()
            .ok_or_else(|| anyhow!("CCM_Application query failed"))
    }

    fn active_logon_sids(&self) -> Result<Vec<String>> {
        self.logon_sids
            .clone()
            .ok_or_else(|| anyhow!("CCM_UserLogonEvents query failed"))
    }

    fn run_program(&self, package_id: &str) -> Result<()> {
        self.launched
            .borrow_mut()
            .push(format!("program:{}", package_id));
        Ok(())
    }

    fn open_application(&self, application_id: &str) -> Result<()> {
        self.launched
            .borrow_mut()
            .push(format!("application:{}", application_id));
        Ok(())
    }
}

/// Directory; `None` account means the directory is unreachable
#[derive(Debug, Default, Clone)]
pub struct FakeDirectory {
    pub account: Option<Account>,
    pub given_name: Option<String>,
    pub expiry_filetime: Option<i64>,
    /// Search base the last given-name lookup was scoped to
    pub seen_search_base: RefCell<Option<String>>,
}

impl Directory for FakeDirectory {
    fn current_account(&self) -> Result<Account> {
        self.account.clone().ok_or_else(|| anyhow!("domain unreachable"))
    }

    fn given_name(&self, _account: &str, search_base: Option<&str>) -> Result<Option<String>> {
        *self.seen_search_base.borrow_mut() = search_base.map(str::to_string);
        if self.account.is_none() {
            return Err(anyhow!("domain unreachable"));
        }
        Ok(self.given_name.clone())
    }

    fn password_expiry_filetime(&self, _account: &Account) -> Result<Option<i64>> {
        if self.account.is_none() {
            return Err(anyhow!("domain unreachable"));
        }
        Ok(self.expiry_filetime)
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeSession {
    pub user: Option<String>,
    pub ui_language: Option<String>,
    pub last_boot: Option<NaiveDateTime>,
    pub system: bool,
    pub restarts: Rc<Cell<u32>>,
}

impl Session for FakeSession {
    fn user_name(&self) -> Option<String> {
        self.user.clone()
    }

    fn ui_language(&self) -> Option<String> {
        self.ui_language.clone()
    }

    fn last_boot(&self) -> Option<NaiveDateTime> {
        self.last_boot
    }

    fn is_system_context(&self) -> bool {
        self.system
    }

    fn restart(&self) -> Result<()> {
        self.restarts.set(self.restarts.get() + 1);
        Ok(())
    }
}

/// Records shown toasts and spoken text
#[derive(Debug, Default, Clone)]
pub struct FakeNotifier {
    pub shown: Rc<RefCell<Vec<(String, String)>>>,
    pub spoken: Rc<RefCell<Vec<String>>>,
    pub fail: bool,
}

impl Notifier for FakeNotifier {
    fn show(&self, app_id: &str, xml: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow!("the notification platform rejected the toast"));
        }
        self.shown
            .borrow_mut()
            .push((app_id.to_string(), xml.to_string()));
        Ok(())
    }

    fn speak(&self, text: &str) -> Result<()> {
        self.spoken.borrow_mut().push(text.to_string());
        Ok(())
    }
}

/// Host over the given registry with every other collaborator defaulted
pub fn host(registry: impl Registry + 'static) -> Host {
    Host {
        registry: Box::new(registry),
        client: Box::new(FakeClient::default()),
        directory: Box::new(FakeDirectory::default()),
        session: Box::new(FakeSession::default()),
        notifier: Box::new(FakeNotifier::default()),
    }
}
