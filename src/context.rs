//! Runtime data for one generation call: the employee, the device rows,
//! observations and, for decommission reports, the extra asset data.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// The person the document is issued to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeInfo {
    pub name: String,
    pub dni: String,
    pub email: String,
    pub position: String,
    pub area: String,
    pub company: Option<String>,
    pub location: Option<String>,
}

/// A device as handed over by the caller, built from persisted asset
/// records. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRow {
    /// Internal category code (`LAPTOP`, `MONITOR`, `KEYBOARD_MOUSE_KIT`, ...).
    #[serde(rename = "type", alias = "category")]
    pub category: String,
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub hostname: String,
    pub inventory_code: String,
    pub imei: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
}

impl DeviceRow {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        self.brand = brand.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_string();
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    pub fn with_inventory_code(mut self, code: &str) -> Self {
        self.inventory_code = code.to_string();
        self
    }

    pub fn with_imei(mut self, imei: &str) -> Self {
        self.imei = Some(imei.to_string());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    /// Serial, falling back to the IMEI for phones.
    pub fn serial_or_imei(&self) -> Option<&str> {
        non_blank(&self.serial).or_else(|| self.imei.as_deref().and_then(non_blank))
    }
}

/// Extra data only decommission reports carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecommissionInfo {
    pub fabrication_year: Option<i32>,
    pub purchase_reason: Option<String>,
    /// Photo of the device (base64 in JSON).
    #[serde(with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub device_image: Option<Vec<u8>>,
    /// Photo of the serial label (base64 in JSON).
    #[serde(with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub serial_image: Option<Vec<u8>>,
}

/// Everything a generation call needs besides the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationContext {
    /// Identifier of the originating record, used in the output file name.
    pub source_id: String,
    pub employee: EmployeeInfo,
    pub observations: Option<String>,
    pub devices: Vec<DeviceRow>,
    pub decommission: Option<DecommissionInfo>,
    /// Document date; today when absent.
    pub date: Option<NaiveDate>,
}

impl GenerationContext {
    pub fn today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// The caller's observation text, treating blanks and a lone dash as absent.
    pub fn observations(&self) -> Option<&str> {
        self.observations
            .as_deref()
            .and_then(non_blank)
            .filter(|s| *s != "-")
    }
}

pub(crate) fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .filter(|s| !s.trim().is_empty())
            .map(|s| STANDARD.decode(s.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialises_request_shaped_json() {
        let json = r#"{
            "source_id": "17",
            "employee": {"name": "Ana Pérez", "dni": "12345678"},
            "devices": [{"type": "LAPTOP", "serial": "abc"}, {"category": "MOBILE", "imei": "359"}],
            "decommission": {"fabrication_year": 2019, "device_image": "AQID"},
            "date": "2024-03-05"
        }"#;
        let ctx: GenerationContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.devices[1].category, "MOBILE");
        assert_eq!(ctx.devices[1].serial_or_imei(), Some("359"));
        let decom = ctx.decommission.as_ref().unwrap();
        assert_eq!(decom.device_image.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(decom.serial_image, None);
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn dash_and_blank_observations_are_absent() {
        let mut ctx = GenerationContext::default();
        ctx.observations = Some(" - ".into());
        assert_eq!(ctx.observations(), None);
        ctx.observations = Some("  ".into());
        assert_eq!(ctx.observations(), None);
        ctx.observations = Some("Todo conforme".into());
        assert_eq!(ctx.observations(), Some("Todo conforme"));
    }
}
