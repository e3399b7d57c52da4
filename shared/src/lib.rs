use serde::{Deserialize, Serialize};

/// IVA (Spanish VAT) rate applied to every contract amount.
pub const IVA: f64 = 0.21;

/// Postal address of a client, decomposed the way the municipal forms are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direccion {
    pub calle: String,
    pub numero: String,
    /// Floor, optional on the form; absent means an empty string
    #[serde(default)]
    pub piso: String,
    /// Door, optional on the form; absent means an empty string
    #[serde(default)]
    pub puerta: String,
    /// Postal code
    pub cp: String,
    pub localidad: String,
    pub provincia: String,
}

/// A municipal client record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cliente {
    /// Store-assigned identifier, immutable after creation
    pub id: i64,
    pub nombre: String,
    pub apellido: String,
    /// Free-form phone number
    pub telefono: String,
    /// National identity code, 8 digits followed by one uppercase letter
    pub dni: String,
    pub direccion: Direccion,
    /// Store-assigned creation timestamp (UTC, `YYYY-MM-DD HH:MM:SS`)
    pub created_at: String,
}

/// Payload for creating or fully replacing a client (no id, no timestamps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuevoCliente {
    pub nombre: String,
    pub apellido: String,
    pub telefono: String,
    pub dni: String,
    pub direccion: Direccion,
}

/// A contract owned by exactly one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contrato {
    /// Store-assigned identifier, immutable after creation
    pub id: i64,
    /// Owning client
    pub cliente_id: i64,
    /// Contract code, unique across all contracts (not per client)
    pub codigo_contrato: String,
    /// Fiscal year
    pub anualidad: i64,
    pub denominacion: String,
    /// Tax-exclusive amount as supplied by the caller
    pub importe_sin_iva: f64,
    /// Tax-inclusive amount, always derived server-side from `importe_sin_iva`
    pub importe_con_iva: f64,
    /// Store-assigned creation timestamp (UTC, `YYYY-MM-DD HH:MM:SS`)
    pub created_at: String,
}

/// Payload for creating or fully replacing a contract.
///
/// There is deliberately no `importe_con_iva` field: the inclusive amount is
/// recomputed on every write, and a caller-supplied value is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuevoContrato {
    pub cliente_id: i64,
    pub codigo_contrato: String,
    pub anualidad: i64,
    pub denominacion: String,
    pub importe_sin_iva: f64,
}

/// A client together with its contracts, ordered by fiscal year then code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClienteConContratos {
    #[serde(flatten)]
    pub cliente: Cliente,
    pub contratos: Vec<Contrato>,
}

/// Check a Spanish DNI: exactly 8 ASCII digits followed by one uppercase
/// ASCII letter, nothing else.
pub fn dni_valido(dni: &str) -> bool {
    let bytes = dni.as_bytes();
    bytes.len() == 9
        && bytes[..8].iter().all(|b| b.is_ascii_digit())
        && bytes[8].is_ascii_uppercase()
}

/// Derive the tax-inclusive amount: `importe * 1.21`, rounded to two
/// decimals, half away from zero.
pub fn importe_con_iva(importe_sin_iva: f64) -> f64 {
    (importe_sin_iva * (1.0 + IVA) * 100.0).round() / 100.0
}
