//! Variable registry: turns a template's mapping plus the runtime context
//! into the scalar placeholder table, and partitions out the table and image
//! placeholders so they are never printed as text.

use chrono::{Datelike, NaiveDate};

use crate::context::{non_blank, DeviceRow, GenerationContext};
use crate::devices::NOT_AVAILABLE;
use crate::mapping::{KeyKind, MappingEntry, MappingSource, SemanticKey, Template, TemplateCategory};
use crate::placeholders::{surface_variants, PlaceholderMap};

/// Company printed on mobile actas when the employee has none on record.
pub const ORGANIZATION_NAME: &str = "TRANSTOTAL AGENCIA MARITIMA S.A.";
/// Location used when the employee has none on record.
pub const DEFAULT_LOCATION: &str = "CALLAO";

const MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto",
    "setiembre", "octubre", "noviembre", "diciembre",
];

pub const ASSIGNMENT_OBSERVATION: &str =
    "Se hace entrega de los equipos asignados en óptimas condiciones para el desempeño de sus funciones.";
pub const RETURN_OBSERVATION: &str =
    "Se recibe equipos completos en buen estado de conservación y funcionamiento.";
pub const DECOMMISSION_OBSERVATION: &str =
    "Se procede a la baja del activo del inventario por motivo justificado.";

/// Output of [`resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedVariables {
    /// Token → value for scalar substitution. Never contains table or
    /// image placeholders.
    pub scalars: PlaceholderMap,
    /// Mapping entries whose key is a table key, in declaration order.
    pub tables: Vec<MappingEntry>,
    /// Mapping entries whose key is an image key.
    pub images: Vec<MappingEntry>,
    /// How the mapping was obtained.
    pub source: MappingSource,
}

/// `5 de marzo de 2024`
pub fn long_date(date: NaiveDate) -> String {
    format!("{} de {} de {}", date.day(), month_name(date), date.year())
}

pub fn numeric_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn month_name(date: NaiveDate) -> &'static str {
    MONTHS[date.month0() as usize]
}

/// Default observation text for a category.
pub fn default_observation(category: TemplateCategory) -> &'static str {
    if category.is_assignment() {
        ASSIGNMENT_OBSERVATION
    } else if category.is_return() {
        RETURN_OBSERVATION
    } else if category.is_decommission() {
        DECOMMISSION_OBSERVATION
    } else {
        ""
    }
}

/// Whole years between manufacture and `today`, floored at zero.
pub fn usage_years(fabrication_year: i32, today: NaiveDate) -> i32 {
    (today.year() - fabrication_year).max(0)
}

fn upper(s: &str) -> String {
    s.trim().to_uppercase()
}

fn or_not_available(value: Option<&str>) -> String {
    value
        .and_then(non_blank)
        .filter(|v| *v != "-")
        .map(str::to_string)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn company(ctx: &GenerationContext, category: TemplateCategory) -> String {
    match ctx.employee.company.as_deref().and_then(non_blank) {
        Some(c) => upper(c),
        None if category.is_mobile() => ORGANIZATION_NAME.to_string(),
        None => String::new(),
    }
}

fn location(ctx: &GenerationContext) -> String {
    upper(
        ctx.employee
            .location
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(DEFAULT_LOCATION),
    )
}

fn main_device_type(device: &DeviceRow) -> String {
    match upper(&device.category).as_str() {
        "HEADPHONES" => "AURICULARES".to_string(),
        "BACKPACK" => "MOCHILA".to_string(),
        "CHARGER" => "CARGADOR".to_string(),
        other => other.to_string(),
    }
}

fn observation_or(ctx: &GenerationContext, fallback: &str) -> String {
    ctx.observations().unwrap_or(fallback).to_string()
}

/// Value of a scalar key. `None` for table and image keys.
pub fn scalar_value(key: SemanticKey, ctx: &GenerationContext, category: TemplateCategory) -> Option<String> {
    let employee = &ctx.employee;
    let today = ctx.today();
    let main = ctx.devices.first();
    let decom = ctx.decommission.as_ref();

    let value = match key {
        SemanticKey::EmployeeName => upper(&employee.name),
        SemanticKey::EmployeeDni => employee.dni.trim().to_string(),
        SemanticKey::EmployeeEmail => employee.email.trim().to_string(),
        SemanticKey::EmployeePosition => upper(&employee.position),
        SemanticKey::EmployeeArea => upper(&employee.area),
        SemanticKey::EmployeeCompany => company(ctx, category),
        SemanticKey::EmployeeLocation => location(ctx),

        SemanticKey::DeviceType => main.map(main_device_type).unwrap_or_default(),
        SemanticKey::DeviceBrand => main.map(|d| upper(&d.brand)).unwrap_or_default(),
        SemanticKey::DeviceModel => main.map(|d| upper(&d.model)).unwrap_or_default(),
        SemanticKey::DeviceSerial => main
            .and_then(DeviceRow::serial_or_imei)
            .map(upper)
            .unwrap_or_default(),
        SemanticKey::DeviceHostname => or_not_available(main.map(|d| d.hostname.as_str())).to_uppercase(),
        SemanticKey::DeviceInventoryCode => {
            or_not_available(main.map(|d| d.inventory_code.as_str())).to_uppercase()
        }

        SemanticKey::CurrentDate => numeric_date(today),
        SemanticKey::CurrentDateLong => long_date(today),
        SemanticKey::CurrentYear => today.year().to_string(),
        SemanticKey::CurrentMonth => month_name(today).to_uppercase(),

        SemanticKey::ActaObservations => observation_or(ctx, default_observation(category)),
        SemanticKey::AssignmentObservations => observation_or(ctx, ASSIGNMENT_OBSERVATION),
        SemanticKey::ReturnObservations => observation_or(ctx, RETURN_OBSERVATION),
        SemanticKey::DecommissionObservations => observation_or(ctx, DECOMMISSION_OBSERVATION),

        SemanticKey::FabricationYear => decom
            .and_then(|d| d.fabrication_year)
            .map(|y| y.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        SemanticKey::UsageTime => decom
            .and_then(|d| d.fabrication_year)
            .map(|y| format!("{} años", usage_years(y, today)))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        SemanticKey::PurchaseReason => or_not_available(decom.and_then(|d| d.purchase_reason.as_deref())),

        _ => return None,
    };
    Some(value)
}

/// Resolve `template`'s mapping against `ctx`.
pub fn resolve(template: &Template, ctx: &GenerationContext) -> ResolvedVariables {
    resolve_with(template.load_mapping(), template.category, ctx)
}

/// Like [`resolve`] with an already loaded mapping.
pub fn resolve_with(source: MappingSource, category: TemplateCategory, ctx: &GenerationContext) -> ResolvedVariables {
    let mut scalars = PlaceholderMap::new();
    let mut tables = Vec::new();
    let mut images = Vec::new();

    match &source {
        MappingSource::Declared(mapping) => {
            for entry in mapping.entries() {
                match entry.key.kind() {
                    KeyKind::Table => {
                        log::debug!("Skipping table placeholder {} -> {}", entry.placeholder, entry.key);
                        tables.push(entry.clone());
                    }
                    KeyKind::Image => images.push(entry.clone()),
                    KeyKind::Scalar => {
                        if let Some(value) = scalar_value(entry.key, ctx, category) {
                            scalars.insert(&entry.placeholder, &value);
                        }
                    }
                }
            }
        }
        MappingSource::Legacy => insert_legacy(&mut scalars, ctx, category),
    }

    insert_device_tokens(&mut scalars, &ctx.devices);

    // Table and image placeholders must survive scalar substitution.
    for entry in tables.iter().chain(images.iter()) {
        for token in surface_variants(&entry.placeholder) {
            scalars.remove_token(&token);
        }
    }

    log::debug!(
        "Resolved {} scalar tokens, {} table and {} image placeholders",
        scalars.len(),
        tables.len(),
        images.len()
    );
    ResolvedVariables {
        scalars,
        tables,
        images,
        source,
    }
}

/// `NOMBRE_EMPLEADO` → `Nombre_Empleado`
fn title_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let lower = part.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Legacy names in every form authored templates used: the four surface
/// variants plus Title case.
fn insert_legacy_name(map: &mut PlaceholderMap, name: &str, value: &str) {
    map.insert(name, value);
    map.insert_token(format!("{{{{{}}}}}", title_case(name)), value);
}

/// Built-in placeholders for templates without a usable mapping.
fn insert_legacy(map: &mut PlaceholderMap, ctx: &GenerationContext, category: TemplateCategory) {
    let name = upper(&ctx.employee.name);
    let dni = ctx.employee.dni.trim().to_string();
    let company = company(ctx, category);
    let date = long_date(ctx.today());
    let location = location(ctx);

    map.insert_token("«NOMBRE»", name.as_str());
    for key in ["NOMBRE", "NOMBRE_EMPLEADO", "USUARIO"] {
        insert_legacy_name(map, key, &name);
    }
    insert_legacy_name(map, "DNI", &dni);
    insert_legacy_name(map, "EMPRESA", &company);
    for key in ["FECHA", "FECHA_LARGA", "FECHALARGA"] {
        insert_legacy_name(map, key, &date);
    }

    // SEDE keeps its case: upper for upper-case tokens, Title case otherwise.
    let sede_title = title_case(&location);
    map.insert_token("{{SEDE}}", location.as_str());
    map.insert_token("{{ SEDE }}", location.as_str());
    map.insert_token("{{sede}}", sede_title.as_str());
    map.insert_token("{{ sede }}", sede_title.as_str());
    map.insert_token("{{Sede}}", sede_title.as_str());
}

/// Per-device tokens such as `{{SERIE_LAPTOP}}` or `{{IMEI_CELULAR}}`.
fn insert_device_tokens(map: &mut PlaceholderMap, devices: &[DeviceRow]) {
    for device in devices {
        let code = upper(&device.category);
        if code.is_empty() {
            continue;
        }
        let mobile = matches!(code.as_str(), "MOBILE" | "CHIP");
        let suffix = match code.as_str() {
            "MOBILE" => "CELULAR".to_string(),
            "CHIP" => "CHIPSIM".to_string(),
            _ => code,
        };

        let serial = match device.serial_or_imei() {
            Some(s) => upper(s),
            None if mobile => "-".to_string(),
            None => String::new(),
        };
        let mut fields = vec![
            ("SERIE", serial),
            ("MARCA", upper(&device.brand)),
            ("MODELO", upper(&device.model)),
        ];
        if mobile {
            fields.push(("IMEI", upper(device.imei.as_deref().unwrap_or(""))));
        } else {
            fields.push(("HOSTNAME", upper(&device.hostname)));
        }

        for (prefix, value) in fields {
            map.insert_token(format!("{{{{{prefix}_{suffix}}}}}"), value.as_str());
            map.insert_token(format!("{{{{ {prefix}_{suffix} }}}}"), value.as_str());
        }
    }
}
