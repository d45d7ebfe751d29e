use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

/// A 64-bit Steam ID in its 17-digit decimal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SteamId(String);

impl SteamId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 17 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(AppError::InvalidSteamId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SteamId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Steam account as the cache knows it. The name only labels the cache
/// folder; it does not need to match the Steam persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub steam_id: SteamId,
}

impl Account {
    pub fn new(name: &str, steam_id: SteamId) -> Self {
        // '_' separates name and id in the folder name
        let name = name.trim().replace(['_', '/', '\\'], "-");
        let name = if name.is_empty() {
            steam_id.to_string()
        } else {
            name
        };
        Self { name, steam_id }
    }

    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.name, self.steam_id)
    }

    pub fn cache_folder(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(self.folder_name())
    }

    fn from_folder_name(folder: &str) -> Option<Self> {
        let (name, id) = folder.rsplit_once('_')?;
        let steam_id = SteamId::parse(id).ok()?;
        Some(Self {
            name: name.to_string(),
            steam_id,
        })
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} : {}", self.name, self.steam_id)
    }
}

/// Accounts that already have a cache folder under `cache_root`, sorted by name.
pub fn known_accounts(cache_root: &Path) -> Result<Vec<Account>> {
    if !cache_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut accounts = Vec::new();
    for entry in std::fs::read_dir(cache_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let folder = entry.file_name();
        match Account::from_folder_name(&folder.to_string_lossy()) {
            Some(account) => accounts.push(account),
            None => log::debug!("Ignoring cache folder {:?}", folder),
        }
    }
    accounts.sort_by(|a, b| a.name.cmp(&b.name).then(a.steam_id.cmp(&b.steam_id)));
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "76561198142605500";

    #[test]
    fn steam_id_must_be_seventeen_digits() {
        assert!(SteamId::parse(ID).is_ok());
        assert!(SteamId::parse(&format!(" {ID}\n")).is_ok());
        assert!(SteamId::parse("7656119814260550").is_err());
        assert!(SteamId::parse("7656119814260550x").is_err());
        assert!(SteamId::parse("").is_err());
    }

    #[test]
    fn folder_name_round_trips() {
        let account = Account::new("main", SteamId::parse(ID).unwrap());
        assert_eq!(account.folder_name(), format!("main_{ID}"));
        assert_eq!(
            Account::from_folder_name(&account.folder_name()),
            Some(account)
        );
    }

    #[test]
    fn underscores_in_names_are_replaced() {
        let account = Account::new("my_alt", SteamId::parse(ID).unwrap());
        assert_eq!(account.name, "my-alt");
    }

    #[test]
    fn blank_name_falls_back_to_the_id() {
        let account = Account::new("  ", SteamId::parse(ID).unwrap());
        assert_eq!(account.name, ID);
    }

    #[test]
    fn known_accounts_lists_valid_folders_only() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join(format!("zed_{ID}"))).unwrap();
        std::fs::create_dir(root.path().join(format!("amy_{ID}"))).unwrap();
        std::fs::create_dir(root.path().join("junk")).unwrap();
        std::fs::write(root.path().join("playtime-ratio.log"), "").unwrap();

        let names: Vec<String> = known_accounts(root.path())
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }

    #[test]
    fn missing_cache_root_means_no_accounts() {
        let root = tempfile::tempdir().unwrap();
        assert!(known_accounts(&root.path().join("nope")).unwrap().is_empty());
    }
}
