use thiserror::Error;
use tracing::info;

use crate::db::{DbConnection, StoreError};
use shared::{
    dni_valido, importe_con_iva, Cliente, ClienteConContratos, Contrato, NuevoCliente,
    NuevoContrato,
};

/// Domain-level failure taxonomy. Conflict and not-found carry the
/// human-readable messages the UI shows verbatim.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed input, rejected before any store access
    #[error("{0}")]
    Validation(String),
    /// Uniqueness violation translated into a constraint-specific message
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(&'static str),
    /// Anything else the store reports
    #[error(transparent)]
    Database(sqlx::Error),
}

impl DomainError {
    fn dni_invalido() -> Self {
        DomainError::Validation(
            "DNI inválido. Debe tener 8 dígitos seguidos de una letra mayúscula.".to_string(),
        )
    }
}

/// Service for managing municipal clients
#[derive(Clone)]
pub struct ClienteService {
    db: DbConnection,
}

impl ClienteService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// List all clients, ordered by family name then given name
    pub async fn list(&self) -> Result<Vec<Cliente>, DomainError> {
        let clientes = self.db.list_clientes().await.map_err(internal)?;
        info!("Listed {} clientes", clientes.len());
        Ok(clientes)
    }

    /// Get a client with its contracts embedded
    pub async fn get(&self, id: i64) -> Result<ClienteConContratos, DomainError> {
        let cliente = self
            .db
            .get_cliente(id)
            .await
            .map_err(internal)?
            .ok_or(DomainError::NotFound("Cliente no encontrado"))?;
        let contratos = self.db.contratos_de_cliente(id).await.map_err(internal)?;
        Ok(ClienteConContratos { cliente, contratos })
    }

    /// Create a client. The DNI format is checked before the store is
    /// touched; a duplicate DNI surfaces as a conflict.
    pub async fn create(&self, nuevo: NuevoCliente) -> Result<Cliente, DomainError> {
        if !dni_valido(&nuevo.dni) {
            return Err(DomainError::dni_invalido());
        }

        let id = self.db.insert_cliente(&nuevo).await.map_err(|err| match err {
            StoreError::Unique => {
                DomainError::Conflict("Ya existe un cliente con ese DNI.".to_string())
            }
            other => internal(other),
        })?;

        info!("Created cliente {} ({} {})", id, nuevo.nombre, nuevo.apellido);
        self.read_back(id).await
    }

    /// Replace all fields of a client. Updating a missing id is a not-found,
    /// not a silent no-op.
    pub async fn update(&self, id: i64, nuevo: NuevoCliente) -> Result<Cliente, DomainError> {
        if !dni_valido(&nuevo.dni) {
            return Err(DomainError::dni_invalido());
        }

        let rows = self.db.update_cliente(id, &nuevo).await.map_err(|err| match err {
            StoreError::Unique => {
                DomainError::Conflict("Ya existe un cliente con ese DNI.".to_string())
            }
            other => internal(other),
        })?;
        if rows == 0 {
            return Err(DomainError::NotFound("Cliente no encontrado"));
        }

        info!("Updated cliente {}", id);
        self.read_back(id).await
    }

    /// Delete a client and, atomically, all of its contracts
    pub async fn delete(&self, id: i64) -> Result<(), DomainError> {
        self.db.delete_cliente(id).await.map_err(internal)?;
        info!("Deleted cliente {} and its contratos", id);
        Ok(())
    }

    /// Re-read a written row so the caller sees exactly what was stored
    async fn read_back(&self, id: i64) -> Result<Cliente, DomainError> {
        self.db
            .get_cliente(id)
            .await
            .map_err(internal)?
            .ok_or(DomainError::NotFound("Cliente no encontrado"))
    }
}

/// Service for managing contracts
#[derive(Clone)]
pub struct ContratoService {
    db: DbConnection,
}

impl ContratoService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// List the contracts of one client, ordered by fiscal year then code
    pub async fn list_for_cliente(&self, cliente_id: i64) -> Result<Vec<Contrato>, DomainError> {
        let contratos = self.db.contratos_de_cliente(cliente_id).await.map_err(internal)?;
        info!("Listed {} contratos for cliente {}", contratos.len(), cliente_id);
        Ok(contratos)
    }

    pub async fn get(&self, id: i64) -> Result<Contrato, DomainError> {
        self.db
            .get_contrato(id)
            .await
            .map_err(internal)?
            .ok_or(DomainError::NotFound("Contrato no encontrado"))
    }

    /// Create a contract. The tax-inclusive amount is derived here; whatever
    /// the caller may have sent for it never reaches the store.
    pub async fn create(&self, nuevo: NuevoContrato) -> Result<Contrato, DomainError> {
        let con_iva = importe_con_iva(nuevo.importe_sin_iva);

        let id = self
            .db
            .insert_contrato(&nuevo, con_iva)
            .await
            .map_err(Self::classify_write_error)?;

        info!("Created contrato {} ({})", id, nuevo.codigo_contrato);
        self.get(id).await
    }

    /// Replace all caller-settable fields, recomputing the inclusive amount
    pub async fn update(&self, id: i64, nuevo: NuevoContrato) -> Result<Contrato, DomainError> {
        let con_iva = importe_con_iva(nuevo.importe_sin_iva);

        let rows = self
            .db
            .update_contrato(id, &nuevo, con_iva)
            .await
            .map_err(Self::classify_write_error)?;
        if rows == 0 {
            return Err(DomainError::NotFound("Contrato no encontrado"));
        }

        info!("Updated contrato {}", id);
        self.get(id).await
    }

    /// Delete one contract; clients are untouched
    pub async fn delete(&self, id: i64) -> Result<(), DomainError> {
        self.db.delete_contrato(id).await.map_err(internal)?;
        info!("Deleted contrato {}", id);
        Ok(())
    }

    fn classify_write_error(err: StoreError) -> DomainError {
        match err {
            StoreError::Unique => {
                DomainError::Conflict("Ya existe un contrato con ese código.".to_string())
            }
            StoreError::ForeignKey => {
                DomainError::Validation("El cliente referenciado no existe.".to_string())
            }
            other => internal(other),
        }
    }
}

fn internal(err: StoreError) -> DomainError {
    match err {
        StoreError::Other(inner) => DomainError::Database(inner),
        // Constraint violations that reach here were not expected for the
        // statement that produced them; report them as conflicts as-is
        other => DomainError::Conflict(other.to_string()),
    }
}
