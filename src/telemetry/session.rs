// Session roster parsing from the simulation's YAML session string

use log::debug;
use yaml_rust::{Yaml, YamlLoader};

use super::{DriverInfo, SessionInfo};
use crate::DashError;

impl SessionInfo {
    pub fn from_yaml_str(text: &str) -> Result<Self, DashError> {
        let docs = YamlLoader::load_from_str(text).map_err(|e| DashError::SessionInfoParse {
            reason: format!("invalid yaml: {}", e),
        })?;
        let doc = docs.first().ok_or(DashError::SessionInfoParse {
            reason: "empty session info".to_string(),
        })?;
        Self::from_yaml(doc)
    }

    pub fn from_yaml(doc: &Yaml) -> Result<Self, DashError> {
        let driver_info = &doc["DriverInfo"];
        if driver_info.is_badvalue() {
            return Err(DashError::SessionInfoParse {
                reason: "missing DriverInfo section".to_string(),
            });
        }

        let player_car_idx =
            driver_info["DriverCarIdx"]
                .as_i64()
                .ok_or(DashError::SessionInfoParse {
                    reason: "missing DriverInfo.DriverCarIdx".to_string(),
                })? as i32;

        let drivers = driver_info["Drivers"]
            .as_vec()
            .map(|drivers| drivers.iter().filter_map(parse_driver).collect())
            .unwrap_or_default();

        Ok(SessionInfo {
            player_car_idx,
            drivers,
        })
    }
}

fn parse_driver(entry: &Yaml) -> Option<DriverInfo> {
    let Some(car_idx) = entry["CarIdx"].as_i64() else {
        debug!("Skipping roster entry without CarIdx");
        return None;
    };

    Some(DriverInfo {
        car_idx: car_idx as i32,
        user_name: yaml_text(&entry["UserName"]),
        is_pace_car: yaml_flag(&entry["CarIsPaceCar"]),
        is_spectator: yaml_flag(&entry["IsSpectator"]),
    })
}

// Driver names made of digits only are parsed as numbers by the loader
fn yaml_text(value: &Yaml) -> String {
    match value {
        Yaml::String(s) => s.trim().to_string(),
        Yaml::Integer(i) => i.to_string(),
        Yaml::Real(r) => r.clone(),
        Yaml::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

fn yaml_flag(value: &Yaml) -> bool {
    match value {
        Yaml::Integer(i) => *i != 0,
        Yaml::Boolean(b) => *b,
        _ => false,
    }
}
