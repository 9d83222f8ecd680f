//! Device transformation: turns the caller's device list into the ordered,
//! decomposed and redacted rows that end up in the device table.
//!
//! Per input row: upper-case every field, split keyboard/mouse kits, redact
//! synthetic serials, relabel category codes and add the implicit monitor
//! cables. The resulting groups are then stably sorted by display order.

use crate::context::DeviceRow;

/// Serial and field placeholder for "intentionally empty".
pub const DASH: &str = "-";
/// Shown in table cells that have no value.
pub const NOT_AVAILABLE: &str = "N/A";
/// Status when the caller supplies none.
pub const DEFAULT_STATUS: &str = "USADO";

/// Chargers registered without a real serial get one with this prefix.
const SYNTHETIC_CHARGER_PREFIX: &str = "CHARGER-";

/// Sort key for labels missing from [`display_order`].
pub const UNKNOWN_ORDER: u32 = 99;

/// A device row as it appears in the generated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    /// Display label of the equipment (`LAPTOP`, `TECLADO`, `CABLE HDMI`, ...).
    pub equipment: String,
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub hostname: String,
    pub inventory_code: String,
    pub status: String,
    pub order: u32,
}

impl DisplayRow {
    fn new(equipment: &str, brand: &str, model: &str, serial: &str, hostname: &str, inventory_code: &str, status: &str) -> Self {
        Self {
            equipment: equipment.to_string(),
            brand: brand.to_string(),
            model: model.to_string(),
            serial: serial.to_string(),
            hostname: hostname.to_string(),
            inventory_code: inventory_code.to_string(),
            status: status.to_string(),
            order: display_order(equipment),
        }
    }

    /// An accessory synthesised next to its parent row.
    fn accessory(equipment: &str, status: &str) -> Self {
        Self::new(equipment, DASH, DASH, DASH, DASH, DASH, status)
    }
}

/// Display label for an internal category code.
pub fn display_label(code: &str) -> String {
    let code = code.trim().to_uppercase();
    match code.as_str() {
        "HEADPHONES" => "AURICULARES".to_string(),
        "BACKPACK" => "MOCHILA".to_string(),
        "CHARGER" => "CARGADOR DE LAPTOP".to_string(),
        _ => code,
    }
}

/// Fixed position of a display label in the table.
pub fn display_order(label: &str) -> u32 {
    match label {
        "LAPTOP" => 1,
        "CARGADOR DE LAPTOP" => 2,
        "MONITOR" => 3,
        "CABLE DE PODER" => 4,
        "CABLE HDMI" => 5,
        "TECLADO" => 6,
        "MOUSE" => 7,
        "AURICULARES" => 8,
        "MOCHILA" => 9,
        _ => UNKNOWN_ORDER,
    }
}

fn upper_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// Run the transformation. Pure and deterministic for a given input order.
pub fn transform(rows: &[DeviceRow]) -> Vec<DisplayRow> {
    // Each group sorts as a unit so a monitor keeps its cables right after it.
    let mut groups: Vec<Vec<DisplayRow>> = Vec::with_capacity(rows.len());

    for row in rows {
        let code = row.category.trim().to_uppercase();
        let brand = upper_or(&row.brand, "");
        let model = upper_or(&row.model, "");
        let mut serial = upper_or(row.serial_or_imei().unwrap_or(""), DASH);
        let hostname = upper_or(&row.hostname, "");
        let inventory = upper_or(&row.inventory_code, "");
        let status = upper_or(row.status.as_deref().unwrap_or(""), DEFAULT_STATUS);

        if code == "KEYBOARD_MOUSE_KIT" {
            let (keyboard_model, mouse_model) = split_kit_model(&model);
            groups.push(vec![DisplayRow::new("TECLADO", &brand, &keyboard_model, &serial, DASH, DASH, &status)]);
            groups.push(vec![DisplayRow::new("MOUSE", &brand, &mouse_model, &serial, DASH, DASH, &status)]);
            continue;
        }

        let label = display_label(&code);
        match code.as_str() {
            "BACKPACK" => serial = DASH.to_string(),
            "CHARGER" if serial.starts_with(SYNTHETIC_CHARGER_PREFIX) => serial = DASH.to_string(),
            _ => {}
        }

        let mut group = vec![DisplayRow::new(&label, &brand, &model, &serial, &hostname, &inventory, &status)];
        if label == "MONITOR" {
            group.push(DisplayRow::accessory("CABLE DE PODER", &status));
            group.push(DisplayRow::accessory("CABLE HDMI", &status));
        }
        groups.push(group);
    }

    // Vec::sort_by_key is stable: equal keys keep input order.
    groups.sort_by_key(|g| g.first().map(|r| r.order).unwrap_or(UNKNOWN_ORDER));
    groups.into_iter().flatten().collect()
}

/// `"HSA-A005K / HSA-A011M"` → keyboard and mouse part numbers.
fn split_kit_model(model: &str) -> (String, String) {
    match model.split_once('/') {
        Some((kb, rest)) => {
            let kb = kb.trim().to_string();
            let ms = rest.split('/').next().unwrap_or("").trim();
            let ms = if ms.is_empty() { kb.clone() } else { ms.to_string() };
            (kb, ms)
        }
        None => (model.to_string(), model.to_string()),
    }
}
