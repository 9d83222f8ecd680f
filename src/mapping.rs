//! Templates, their categories and the placeholder → semantic-key mapping.
//!
//! A template's mapping is loaded strictly: every entry must name a key from
//! the closed [`SemanticKey`] vocabulary. Whether a failed load aborts
//! anything is decided by the caller (generation degrades to the legacy
//! placeholder set, see [`Template::load_mapping`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MappingError;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// The document family a template belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateCategory {
    AssignmentComputer,
    AssignmentMobile,
    ReturnComputer,
    ReturnMobile,
    ActaBaja,
    ActaVenta,
    Otros,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 7] = [
        TemplateCategory::AssignmentComputer,
        TemplateCategory::AssignmentMobile,
        TemplateCategory::ReturnComputer,
        TemplateCategory::ReturnMobile,
        TemplateCategory::ActaBaja,
        TemplateCategory::ActaVenta,
        TemplateCategory::Otros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateCategory::AssignmentComputer => "ASSIGNMENT_COMPUTER",
            TemplateCategory::AssignmentMobile => "ASSIGNMENT_MOBILE",
            TemplateCategory::ReturnComputer => "RETURN_COMPUTER",
            TemplateCategory::ReturnMobile => "RETURN_MOBILE",
            TemplateCategory::ActaBaja => "ACTA_BAJA",
            TemplateCategory::ActaVenta => "ACTA_VENTA",
            TemplateCategory::Otros => "OTROS",
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self, TemplateCategory::AssignmentComputer | TemplateCategory::AssignmentMobile)
    }

    pub fn is_return(&self) -> bool {
        matches!(self, TemplateCategory::ReturnComputer | TemplateCategory::ReturnMobile)
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, TemplateCategory::AssignmentMobile | TemplateCategory::ReturnMobile)
    }

    pub fn is_decommission(&self) -> bool {
        *self == TemplateCategory::ActaBaja
    }

    /// File looked up under the templates directory when the template's own
    /// path cannot be resolved.
    pub fn default_template_file(&self) -> &'static str {
        match self {
            TemplateCategory::AssignmentMobile | TemplateCategory::ReturnMobile => {
                "acta_celular_template.docx"
            }
            TemplateCategory::ActaBaja => "INFORME_DE_BAJA.docx",
            _ => "acta_template.docx",
        }
    }

    /// Sub-directory of the output directory that receives this category.
    pub fn output_dir_name(&self) -> &'static str {
        match self {
            TemplateCategory::AssignmentComputer | TemplateCategory::AssignmentMobile => "assignments",
            TemplateCategory::ReturnComputer | TemplateCategory::ReturnMobile => "returns",
            TemplateCategory::ActaBaja => "decommissions",
            TemplateCategory::ActaVenta => "sales",
            TemplateCategory::Otros => "other",
        }
    }

    /// Leading part of generated file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            TemplateCategory::AssignmentComputer => "acta",
            TemplateCategory::AssignmentMobile => "acta_celular",
            TemplateCategory::ReturnComputer => "acta_devolucion",
            TemplateCategory::ReturnMobile => "acta_devolucion_celular",
            TemplateCategory::ActaBaja => "informe_baja",
            TemplateCategory::ActaVenta => "acta_venta",
            TemplateCategory::Otros => "documento",
        }
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Semantic keys
// ---------------------------------------------------------------------------

/// How a semantic key is rendered into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Replaced by a string.
    Scalar,
    /// Replaced by a synthesised device table.
    Table,
    /// Replaced by a picture.
    Image,
}

/// The closed vocabulary a placeholder can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticKey {
    EmployeeName,
    EmployeeDni,
    EmployeeEmail,
    EmployeePosition,
    EmployeeArea,
    EmployeeCompany,
    EmployeeLocation,
    DeviceType,
    DeviceBrand,
    DeviceModel,
    DeviceSerial,
    DeviceHostname,
    DeviceInventoryCode,
    CurrentDate,
    CurrentDateLong,
    CurrentYear,
    CurrentMonth,
    ActaObservations,
    AssignmentObservations,
    ReturnObservations,
    DecommissionObservations,
    FabricationYear,
    UsageTime,
    PurchaseReason,
    DeviceImage,
    SerialImage,
    DeviceTable,
    AssignmentComputerTable,
    AssignmentMobileTable,
    MobileDevicesTable,
    ReturnedDevicesTable,
    ReturnComputerTable,
    ReturnMobileTable,
    DecommissionTable,
    SaleTable,
}

impl SemanticKey {
    pub const ALL: [SemanticKey; 35] = [
        SemanticKey::EmployeeName,
        SemanticKey::EmployeeDni,
        SemanticKey::EmployeeEmail,
        SemanticKey::EmployeePosition,
        SemanticKey::EmployeeArea,
        SemanticKey::EmployeeCompany,
        SemanticKey::EmployeeLocation,
        SemanticKey::DeviceType,
        SemanticKey::DeviceBrand,
        SemanticKey::DeviceModel,
        SemanticKey::DeviceSerial,
        SemanticKey::DeviceHostname,
        SemanticKey::DeviceInventoryCode,
        SemanticKey::CurrentDate,
        SemanticKey::CurrentDateLong,
        SemanticKey::CurrentYear,
        SemanticKey::CurrentMonth,
        SemanticKey::ActaObservations,
        SemanticKey::AssignmentObservations,
        SemanticKey::ReturnObservations,
        SemanticKey::DecommissionObservations,
        SemanticKey::FabricationYear,
        SemanticKey::UsageTime,
        SemanticKey::PurchaseReason,
        SemanticKey::DeviceImage,
        SemanticKey::SerialImage,
        SemanticKey::DeviceTable,
        SemanticKey::AssignmentComputerTable,
        SemanticKey::AssignmentMobileTable,
        SemanticKey::MobileDevicesTable,
        SemanticKey::ReturnedDevicesTable,
        SemanticKey::ReturnComputerTable,
        SemanticKey::ReturnMobileTable,
        SemanticKey::DecommissionTable,
        SemanticKey::SaleTable,
    ];

    /// The identifier stored in template mappings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticKey::EmployeeName => "EMPLOYEE_NAME",
            SemanticKey::EmployeeDni => "EMPLOYEE_DNI",
            SemanticKey::EmployeeEmail => "EMPLOYEE_EMAIL",
            SemanticKey::EmployeePosition => "EMPLOYEE_POSITION",
            SemanticKey::EmployeeArea => "EMPLOYEE_AREA",
            SemanticKey::EmployeeCompany => "EMPLOYEE_COMPANY",
            SemanticKey::EmployeeLocation => "EMPLOYEE_LOCATION",
            SemanticKey::DeviceType => "DEVICE_TYPE",
            SemanticKey::DeviceBrand => "DEVICE_BRAND",
            SemanticKey::DeviceModel => "DEVICE_MODEL",
            SemanticKey::DeviceSerial => "DEVICE_SERIAL",
            SemanticKey::DeviceHostname => "DEVICE_HOSTNAME",
            SemanticKey::DeviceInventoryCode => "DEVICE_INVENTORY_CODE",
            SemanticKey::CurrentDate => "CURRENT_DATE",
            SemanticKey::CurrentDateLong => "CURRENT_DATE_LONG",
            SemanticKey::CurrentYear => "CURRENT_YEAR",
            SemanticKey::CurrentMonth => "CURRENT_MONTH",
            SemanticKey::ActaObservations => "ACTA_OBSERVATIONS",
            SemanticKey::AssignmentObservations => "ASSIGNMENT_OBSERVATIONS",
            SemanticKey::ReturnObservations => "RETURN_OBSERVATIONS",
            SemanticKey::DecommissionObservations => "DECOMMISSION_OBSERVATIONS",
            SemanticKey::FabricationYear => "FABRICATION_YEAR",
            SemanticKey::UsageTime => "USAGE_TIME",
            SemanticKey::PurchaseReason => "PURCHASE_REASON",
            SemanticKey::DeviceImage => "DEVICE_IMAGE_PATH",
            SemanticKey::SerialImage => "SERIAL_IMAGE_PATH",
            SemanticKey::DeviceTable => "DEVICE_TABLE",
            SemanticKey::AssignmentComputerTable => "ASSIGNMENT_COMPUTER_TABLE",
            SemanticKey::AssignmentMobileTable => "ASSIGNMENT_MOBILE_TABLE",
            SemanticKey::MobileDevicesTable => "MOBILE_DEVICES_TABLE",
            SemanticKey::ReturnedDevicesTable => "RETURNED_DEVICES_TABLE",
            SemanticKey::ReturnComputerTable => "RETURN_COMPUTER_TABLE",
            SemanticKey::ReturnMobileTable => "RETURN_MOBILE_TABLE",
            SemanticKey::DecommissionTable => "DECOMMISSION_TABLE",
            SemanticKey::SaleTable => "SALE_TABLE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            SemanticKey::DeviceTable
            | SemanticKey::AssignmentComputerTable
            | SemanticKey::AssignmentMobileTable
            | SemanticKey::MobileDevicesTable
            | SemanticKey::ReturnedDevicesTable
            | SemanticKey::ReturnComputerTable
            | SemanticKey::ReturnMobileTable
            | SemanticKey::DecommissionTable
            | SemanticKey::SaleTable => KeyKind::Table,
            SemanticKey::DeviceImage | SemanticKey::SerialImage => KeyKind::Image,
            _ => KeyKind::Scalar,
        }
    }

    pub fn is_table(&self) -> bool {
        self.kind() == KeyKind::Table
    }
}

impl fmt::Display for SemanticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Variable mapping
// ---------------------------------------------------------------------------

/// One `placeholder → key` pair. `placeholder` is the token text without
/// the `{{ }}` delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub placeholder: String,
    pub key: SemanticKey,
    pub label: Option<String>,
}

/// The ordered mapping declared on a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableMapping {
    entries: Vec<MappingEntry>,
}

impl VariableMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    /// Parse mapping text: a JSON list of `{name, map_to, label?}` objects,
    /// a JSON object `{placeholder: key}`, or a JSON string holding either.
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::String(inner) => {
                let inner: Value = serde_json::from_str(inner)?;
                if inner.is_string() {
                    return Err(MappingError::Shape("mapping encoded more than twice".into()));
                }
                Self::from_value(&inner)
            }
            Value::Array(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    let Value::Object(obj) = item else {
                        return Err(MappingError::Shape(format!("list entry is not an object: {item}")));
                    };
                    let label = obj
                        .get("label")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    if let Some(entry) = Self::entry(str_field(obj, "name"), str_field(obj, "map_to"), label)? {
                        entries.push(entry);
                    }
                }
                Ok(Self { entries })
            }
            Value::Object(obj) => {
                let mut entries = Vec::with_capacity(obj.len());
                for (name, key) in obj {
                    let key = key.as_str().ok_or_else(|| {
                        MappingError::Shape(format!("value for '{name}' is not a string"))
                    })?;
                    if let Some(entry) = Self::entry(name.trim(), key.trim(), None)? {
                        entries.push(entry);
                    }
                }
                Ok(Self { entries })
            }
            Value::Null => Ok(Self::default()),
            other => Err(MappingError::Shape(format!("expected list or object, got {other}"))),
        }
    }

    fn entry(name: &str, key: &str, label: Option<String>) -> Result<Option<MappingEntry>, MappingError> {
        if name.is_empty() || key.is_empty() {
            return Ok(None);
        }
        let placeholder = strip_delimiters(name).to_string();
        let key = SemanticKey::from_name(key).ok_or_else(|| MappingError::UnknownKey {
            placeholder: placeholder.clone(),
            key: key.to_string(),
        })?;
        Ok(Some(MappingEntry { placeholder, key, label }))
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, in declaration order.
    pub fn of_kind(&self, kind: KeyKind) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(move |e| e.key.kind() == kind)
    }

    /// The first entry mapped to a table key.
    pub fn table_entry(&self) -> Option<&MappingEntry> {
        self.of_kind(KeyKind::Table).next()
    }

    /// The placeholder mapped to an image key.
    pub fn placeholder_for(&self, key: SemanticKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.placeholder.as_str())
    }
}

fn str_field<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

/// Accept `{{NAME}}` as well as `NAME` in mapping entries.
fn strip_delimiters(name: &str) -> &str {
    name.strip_prefix("{{")
        .and_then(|n| n.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// A stored template as handed over by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub category: TemplateCategory,
    /// Path of the `.docx` file; resolved through a fallback chain.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Raw mapping as stored (JSON text or inline JSON).
    #[serde(default)]
    pub variables: Option<Value>,
}

/// Outcome of loading a template's mapping for generation.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSource {
    /// A valid mapping was declared.
    Declared(VariableMapping),
    /// No usable mapping: the built-in legacy placeholder set applies.
    Legacy,
}

impl MappingSource {
    pub fn declared(&self) -> Option<&VariableMapping> {
        match self {
            MappingSource::Declared(m) => Some(m),
            MappingSource::Legacy => None,
        }
    }
}

impl Template {
    pub fn new(name: &str, category: TemplateCategory) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            category,
            file_path: None,
            variables: None,
        }
    }

    /// Strict load of the declared mapping. `Ok(None)` when nothing is
    /// declared.
    pub fn mapping(&self) -> Result<Option<VariableMapping>, MappingError> {
        let Some(value) = &self.variables else {
            return Ok(None);
        };
        if matches!(value, Value::String(s) if s.trim().is_empty()) {
            return Ok(None);
        }
        let mapping = VariableMapping::from_value(value)?;
        Ok(if mapping.is_empty() { None } else { Some(mapping) })
    }

    /// Lenient load used at generation time: any problem degrades to the
    /// legacy placeholder set.
    pub fn load_mapping(&self) -> MappingSource {
        match self.mapping() {
            Ok(Some(mapping)) => MappingSource::Declared(mapping),
            Ok(None) => {
                log::debug!("Template '{}' declares no mapping, using legacy placeholders", self.name);
                MappingSource::Legacy
            }
            Err(e) => {
                log::warn!("Template '{}' has a malformed mapping ({e}), using legacy placeholders", self.name);
                MappingSource::Legacy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_key_round_trips_through_its_name() {
        for key in SemanticKey::ALL {
            assert_eq!(SemanticKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(SemanticKey::from_name("NOT_A_KEY"), None);
    }

    #[test]
    fn key_kinds_partition_the_vocabulary() {
        assert_eq!(SemanticKey::SaleTable.kind(), KeyKind::Table);
        assert_eq!(SemanticKey::DeviceImage.kind(), KeyKind::Image);
        assert_eq!(SemanticKey::UsageTime.kind(), KeyKind::Scalar);
        let tables = SemanticKey::ALL.iter().filter(|k| k.is_table()).count();
        assert_eq!(tables, 9);
    }

    #[test]
    fn parses_list_shape_in_order() {
        let raw = r#"[
            {"name": "NOMBRE", "map_to": "EMPLOYEE_NAME", "label": "Nombre"},
            {"name": "TABLA_EQUIPOS", "map_to": "DEVICE_TABLE"},
            {"name": "", "map_to": "EMPLOYEE_DNI"}
        ]"#;
        let m = VariableMapping::parse(raw).unwrap();
        assert_eq!(m.entries().len(), 2);
        assert_eq!(m.entries()[0].label.as_deref(), Some("Nombre"));
        assert_eq!(m.table_entry().unwrap().placeholder, "TABLA_EQUIPOS");
    }

    #[test]
    fn parses_object_and_double_encoded_shapes() {
        let m = VariableMapping::parse(r#"{"{{DNI}}": "EMPLOYEE_DNI"}"#).unwrap();
        assert_eq!(m.entries()[0].placeholder, "DNI");

        let encoded = serde_json::to_string(r#"[{"name":"N","map_to":"EMPLOYEE_NAME"}]"#).unwrap();
        let m = VariableMapping::parse(&encoded).unwrap();
        assert_eq!(m.entries()[0].key, SemanticKey::EmployeeName);
    }

    #[test]
    fn object_shape_keeps_declaration_order() {
        let m = VariableMapping::parse(r#"{"Z_VENTA": "SALE_TABLE", "A_EQUIPOS": "DEVICE_TABLE"}"#).unwrap();
        assert_eq!(m.entries()[0].placeholder, "Z_VENTA");
        assert_eq!(m.table_entry().unwrap().key, SemanticKey::SaleTable);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = VariableMapping::parse(r#"[{"name":"X","map_to":"FAVOURITE_COLOUR"}]"#).unwrap_err();
        assert!(matches!(err, MappingError::UnknownKey { .. }));
    }

    #[test]
    fn malformed_template_mapping_degrades_to_legacy() {
        let mut t = Template::new("t", TemplateCategory::AssignmentComputer);
        assert_eq!(t.load_mapping(), MappingSource::Legacy);

        t.variables = Some(json!("{not json"));
        assert_eq!(t.load_mapping(), MappingSource::Legacy);

        t.variables = Some(json!([{"name": "N", "map_to": "EMPLOYEE_NAME"}]));
        assert!(t.load_mapping().declared().is_some());
    }

    #[test]
    fn category_serde_names() {
        let c: TemplateCategory = serde_json::from_str("\"ACTA_BAJA\"").unwrap();
        assert_eq!(c, TemplateCategory::ActaBaja);
        for c in TemplateCategory::ALL {
            assert_eq!(serde_json::to_string(&c).unwrap(), format!("\"{}\"", c.as_str()));
        }
    }
}
