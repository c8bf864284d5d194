//! # upmconfig - configuration de upmpdrenderer
//!
//! Ce module gère la configuration du renderer :
//! - Chargement du fichier YAML `upmpdrenderer.yaml`
//! - Fusion avec la configuration par défaut intégrée
//! - Surcharges par variables d'environnement (`UPMPD_CONFIG__CLE=valeur`)
//! - Accesseurs typés avec valeurs par défaut
//!
//! La configuration est construite explicitement par le binaire puis passée
//! aux composants qui en ont besoin.
//!
//! ## Usage
//!
//! ```no_run
//! use upmconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let host = config.get_mpd_host();
//! let port = config.get_mpd_port();
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use dirs::home_dir;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};
use tracing::{info, warn};
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("upmpdrenderer.yaml");

const CONFIG_FILE: &str = "upmpdrenderer.yaml";
const ENV_CONFIG_DIR: &str = "UPMPD_CONFIG";
const ENV_PREFIX: &str = "UPMPD_CONFIG__";
const LOCAL_DIR: &str = ".upmpd";

const DEFAULT_FRIENDLY_NAME: &str = "UpMpd";
const DEFAULT_MPD_PORT: u16 = 6600;
const DEFAULT_UPNP_PORT: u16 = 49152;

/// Getter/setter pour une chaîne, avec valeur par défaut
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) => s,
                Ok(Value::Number(n)) => n.to_string(),
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: &str) -> Result<()> {
            self.set_value($path, Value::String(value.to_string()))
        }
    };
}

/// Getter/setter pour un booléen, avec valeur par défaut
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(value) => value_as_bool(&value).unwrap_or($default),
                Err(_) => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Getter/setter pour un port, avec valeur par défaut
macro_rules! impl_port_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u16 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or($default),
                Ok(Value::String(s)) => match s.trim().parse::<u16>() {
                    Ok(port) => port,
                    Err(_) => {
                        warn!("Invalid port '{}' for {}, using {}", s, $path.join("."), $default);
                        $default
                    }
                },
                _ => $default,
            }
        }

        pub fn $setter(&self, port: u16) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(port)))
        }
    };
}

/// Identité OpenHome (fabricant, modèle ou produit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
    pub name: String,
    pub info: String,
    pub url: String,
    pub imageuri: String,
}

/// Radio déclarée dans la configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioDef {
    pub title: String,
    pub url: String,
    pub arturl: String,
}

/// Configuration de upmpdrenderer
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    /// Fichier de sauvegarde ; absent pour une configuration en mémoire
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

impl Config {
    /// Cherche le répertoire de configuration dans l'ordre : argument,
    /// variable `UPMPD_CONFIG`, `./.upmpd`, `~/.upmpd`.
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        if Path::new(LOCAL_DIR).exists() {
            return PathBuf::from(LOCAL_DIR);
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(LOCAL_DIR);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(LOCAL_DIR)
    }

    /// Crée le répertoire si besoin et vérifie les droits d'écriture
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        Ok(())
    }

    /// Charge la configuration.
    ///
    /// 1. Détermine le répertoire de configuration
    /// 2. Charge la configuration par défaut intégrée
    /// 3. Fusionne le fichier `upmpdrenderer.yaml` s'il existe
    /// 4. Applique les surcharges d'environnement
    /// 5. Sauvegarde le résultat (les UDN générés y sont conservés)
    ///
    /// Un fichier absent n'est pas une erreur ; un fichier illisible ou
    /// invalide en est une.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join(CONFIG_FILE);
        let external = if path.exists() {
            let data = fs::read(&path)?;
            info!(config_file = %path.display(), "Loaded config file");
            Some(serde_yaml::from_slice::<Value>(&data)?)
        } else {
            info!(config_file = %path.display(), "Config file not found, using defaults");
            None
        };

        let mut value = Self::merged_defaults(external.as_ref())?;
        apply_overrides(&mut value, env::vars());

        let config = Config {
            config_dir,
            path: Some(path),
            data: Mutex::new(value),
        };
        config.save()?;
        Ok(config)
    }

    /// Configuration en mémoire à partir d'un document YAML (fusionné avec
    /// les valeurs par défaut). Rien n'est écrit sur disque.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let external: Value = serde_yaml::from_str(yaml)?;
        let value = Self::merged_defaults(Some(&external))?;
        Ok(Config {
            config_dir: PathBuf::from("."),
            path: None,
            data: Mutex::new(value),
        })
    }

    fn merged_defaults(external: Option<&Value>) -> Result<Value> {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(external) = external {
            if !external.is_null() {
                merge_yaml(&mut value, &lower_keys_value(external.clone()));
            }
        }
        Ok(lower_keys_value(value))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Sauvegarde la configuration courante
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.data.lock())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Modifie une valeur (chemin de clés) et sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        set_value_internal(&mut self.data.lock(), path, value)?;
        self.save()
    }

    /// Lit une valeur (chemin de clés)
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        get_value_internal(&self.data.lock(), path)
    }

    /// Résout un répertoire géré (absolu, ou relatif au répertoire de
    /// configuration) et le crée s'il n'existe pas.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        };
        let dir = Path::new(&dir);
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.config_dir.join(dir)
        };
        if !absolute.exists() {
            fs::create_dir_all(&absolute)?;
            info!(directory = %absolute.display(), "Created directory");
        }
        Ok(absolute)
    }

    impl_string_config!(get_friendly_name, set_friendly_name, &["friendlyname"], DEFAULT_FRIENDLY_NAME);
    impl_string_config!(get_log_level, set_log_level, &["loglevel"], "info");

    impl_string_config!(get_mpd_host, set_mpd_host, &["mpdhost"], "localhost");
    impl_port_config!(get_mpd_port, set_mpd_port, &["mpdport"], DEFAULT_MPD_PORT);
    impl_string_config!(get_mpd_password, set_mpd_password, &["mpdpassword"], "");

    impl_bool_config!(get_upnpav, set_upnpav, &["upnpav"], true);
    impl_bool_config!(get_openhome, set_openhome, &["openhome"], true);
    impl_bool_config!(get_ownqueue, set_ownqueue, &["ownqueue"], true);
    impl_bool_config!(get_check_content_format, set_check_content_format, &["checkcontentformat"], true);
    impl_bool_config!(get_oh_meta_persist, set_oh_meta_persist, &["ohmetapersist"], true);

    impl_string_config!(get_upnp_ip, set_upnp_ip, &["upnpip"], "");
    impl_string_config!(get_upnp_iface, set_upnp_iface, &["upnpiface"], "");
    impl_port_config!(get_upnp_port, set_upnp_port, &["upnpport"], DEFAULT_UPNP_PORT);

    impl_bool_config!(get_sc_receiver, set_sc_receiver, &["screceiver"], false);
    impl_string_config!(get_sc_stream_url, set_sc_stream_url, &["scstreamurl"], "");

    impl_string_config!(get_ms_proxy, set_ms_proxy, &["msproxy"], "");
    impl_string_config!(get_protocol_info_file, set_protocol_info_file, &["protocolinfo"], "");

    /// Répertoire du cache (métadonnées OpenHome)
    pub fn get_cache_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["cachedir"], "cache")
    }

    /// Nom de la pièce OpenHome ; par défaut le nom convivial.
    pub fn get_oh_product_room(&self) -> String {
        match self.get_value(&["ohproductroom"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => self.get_friendly_name(),
        }
    }

    /// Nom convivial du Media Server ; par défaut `<friendlyname>-mediaserver`.
    pub fn get_ms_friendly_name(&self) -> String {
        match self.get_value(&["msfriendlyname"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => format!("{}-mediaserver", self.get_friendly_name()),
        }
    }

    fn get_product_info(&self, key: &str) -> ProductInfo {
        self.get_value(&[key])
            .ok()
            .and_then(|v| serde_yaml::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn get_oh_manufacturer(&self) -> ProductInfo {
        self.get_product_info("ohmanufacturer")
    }

    pub fn get_oh_model(&self) -> ProductInfo {
        self.get_product_info("ohmodel")
    }

    pub fn get_oh_product(&self) -> ProductInfo {
        self.get_product_info("ohproduct")
    }

    /// Radios déclarées ; les entrées sans URL sont ignorées.
    pub fn get_radios(&self) -> Vec<RadioDef> {
        match self.get_value(&["radios"]) {
            Ok(value @ Value::Sequence(_)) => match serde_yaml::from_value::<Vec<RadioDef>>(value) {
                Ok(radios) => radios.into_iter().filter(|r| !r.url.is_empty()).collect(),
                Err(e) => {
                    warn!("Invalid radios list: {}", e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    /// UDN persistant d'un device, généré au premier appel
    pub fn get_device_udn(&self, name: &str) -> Result<String> {
        let path = &["udn", name];
        match self.get_value(path) {
            Ok(Value::String(udn)) if !udn.trim().is_empty() => {
                let udn = udn.trim();
                Ok(udn.strip_prefix("uuid:").unwrap_or(udn).to_string())
            }
            _ => {
                let new_udn = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_udn.clone()))?;
                Ok(new_udn)
            }
        }
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            match map.get(Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("Path {} is not a map", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

/// Applique les variables `UPMPD_CONFIG__A__B=valeur`.
fn apply_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
            let key_path: Vec<&str> = rest.split("__").filter(|k| !k.is_empty()).collect();
            if key_path.is_empty() {
                continue;
            }
            let yaml_value = serde_yaml::from_str::<Value>(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            if let Err(e) = set_value_internal(config, &key_path, yaml_value) {
                warn!("Ignoring {}: {}", key, e);
            }
        }
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().chars().next()? {
            '1' | 't' | 'T' | 'y' | 'Y' => Some(true),
            '0' | 'f' | 'F' | 'n' | 'N' => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let k = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(k, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Fusionne récursivement `external` dans `default` : les mappings sont
/// fusionnés clé par clé, scalaires et séquences sont remplacés.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
