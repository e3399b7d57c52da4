use std::str::FromStr;
use std::sync::Arc;

use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{migrate::MigrateDatabase, FromRow, Sqlite, SqlitePool};
use thiserror::Error;

use shared::{Cliente, Contrato, Direccion, NuevoCliente, NuevoContrato};

// The database URL for the production database
const DATABASE_URL: &str = "sqlite:contratos.db";

/// Store failures, classified structurally from the driver's error kind
/// rather than by matching on message text.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Unique,
    #[error("foreign key constraint violated")]
    ForeignKey,
    #[error(transparent)]
    Other(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error().map(|db_err| db_err.kind()) {
            Some(ErrorKind::UniqueViolation) => StoreError::Unique,
            Some(ErrorKind::ForeignKeyViolation) => StoreError::ForeignKey,
            _ => StoreError::Other(err),
        }
    }
}

/// Row shape of the `clientes` table; the address is stored flattened.
#[derive(Debug, FromRow)]
struct ClienteRow {
    id: i64,
    nombre: String,
    apellido: String,
    telefono: String,
    dni: String,
    direccion_calle: String,
    direccion_numero: String,
    direccion_piso: Option<String>,
    direccion_puerta: Option<String>,
    direccion_cp: String,
    direccion_localidad: String,
    direccion_provincia: String,
    created_at: String,
}

impl From<ClienteRow> for Cliente {
    fn from(row: ClienteRow) -> Self {
        Cliente {
            id: row.id,
            nombre: row.nombre,
            apellido: row.apellido,
            telefono: row.telefono,
            dni: row.dni,
            direccion: Direccion {
                calle: row.direccion_calle,
                numero: row.direccion_numero,
                piso: row.direccion_piso.unwrap_or_default(),
                puerta: row.direccion_puerta.unwrap_or_default(),
                cp: row.direccion_cp,
                localidad: row.direccion_localidad,
                provincia: row.direccion_provincia,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ContratoRow {
    id: i64,
    cliente_id: i64,
    codigo_contrato: String,
    anualidad: i64,
    denominacion: String,
    importe_sin_iva: f64,
    importe_con_iva: f64,
    created_at: String,
}

impl From<ContratoRow> for Contrato {
    fn from(row: ContratoRow) -> Self {
        Contrato {
            id: row.id,
            cliente_id: row.cliente_id,
            codigo_contrato: row.codigo_contrato,
            anualidad: row.anualidad,
            denominacion: row.denominacion,
            importe_sin_iva: row.importe_sin_iva,
            importe_con_iva: row.importe_con_iva,
            created_at: row.created_at,
        }
    }
}

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        // Connect with foreign-key enforcement on; the contratos FK cascade
        // depends on it
        let options = SqliteConnectOptions::from_str(url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        // Setup database schema
        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize the standard database, honoring a DATABASE_URL override
    pub async fn init() -> Result<Self, StoreError> {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
        Self::new(&url).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self, StoreError> {
        // Generate a unique database name for tests
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clientes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nombre TEXT NOT NULL,
                apellido TEXT NOT NULL,
                telefono TEXT NOT NULL,
                dni TEXT NOT NULL UNIQUE,
                direccion_calle TEXT NOT NULL,
                direccion_numero TEXT NOT NULL,
                direccion_piso TEXT,
                direccion_puerta TEXT,
                direccion_cp TEXT NOT NULL,
                direccion_localidad TEXT NOT NULL,
                direccion_provincia TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contratos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cliente_id INTEGER NOT NULL,
                codigo_contrato TEXT NOT NULL UNIQUE,
                anualidad INTEGER NOT NULL,
                denominacion TEXT NOT NULL,
                importe_sin_iva REAL NOT NULL,
                importe_con_iva REAL NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (cliente_id) REFERENCES clientes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Close the pool, releasing the database handle
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// List all clients, ordered by family name then given name
    pub async fn list_clientes(&self) -> Result<Vec<Cliente>, StoreError> {
        let rows = sqlx::query_as::<_, ClienteRow>(
            "SELECT * FROM clientes ORDER BY apellido, nombre",
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(Cliente::from).collect())
    }

    /// Fetch a single client by id
    pub async fn get_cliente(&self, id: i64) -> Result<Option<Cliente>, StoreError> {
        let row = sqlx::query_as::<_, ClienteRow>("SELECT * FROM clientes WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Cliente::from))
    }

    /// Insert a client and return its store-assigned id
    pub async fn insert_cliente(&self, cliente: &NuevoCliente) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO clientes (nombre, apellido, telefono, dni,
                direccion_calle, direccion_numero, direccion_piso, direccion_puerta,
                direccion_cp, direccion_localidad, direccion_provincia)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cliente.nombre)
        .bind(&cliente.apellido)
        .bind(&cliente.telefono)
        .bind(&cliente.dni)
        .bind(&cliente.direccion.calle)
        .bind(&cliente.direccion.numero)
        .bind(&cliente.direccion.piso)
        .bind(&cliente.direccion.puerta)
        .bind(&cliente.direccion.cp)
        .bind(&cliente.direccion.localidad)
        .bind(&cliente.direccion.provincia)
        .execute(&*self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Replace all fields of a client; returns the number of rows touched
    pub async fn update_cliente(
        &self,
        id: i64,
        cliente: &NuevoCliente,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE clientes
            SET nombre = ?, apellido = ?, telefono = ?, dni = ?,
                direccion_calle = ?, direccion_numero = ?, direccion_piso = ?,
                direccion_puerta = ?, direccion_cp = ?, direccion_localidad = ?,
                direccion_provincia = ?
            WHERE id = ?
            "#,
        )
        .bind(&cliente.nombre)
        .bind(&cliente.apellido)
        .bind(&cliente.telefono)
        .bind(&cliente.dni)
        .bind(&cliente.direccion.calle)
        .bind(&cliente.direccion.numero)
        .bind(&cliente.direccion.piso)
        .bind(&cliente.direccion.puerta)
        .bind(&cliente.direccion.cp)
        .bind(&cliente.direccion.localidad)
        .bind(&cliente.direccion.provincia)
        .bind(id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a client and its contracts atomically. The explicit contract
    /// delete mirrors the schema's ON DELETE CASCADE; both run inside one
    /// transaction so neither is visible without the other.
    pub async fn delete_cliente(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM contratos WHERE cliente_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM clientes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// List a client's contracts, ordered by fiscal year then contract code
    pub async fn contratos_de_cliente(
        &self,
        cliente_id: i64,
    ) -> Result<Vec<Contrato>, StoreError> {
        let rows = sqlx::query_as::<_, ContratoRow>(
            "SELECT * FROM contratos WHERE cliente_id = ? ORDER BY anualidad, codigo_contrato",
        )
        .bind(cliente_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(Contrato::from).collect())
    }

    /// Fetch a single contract by id
    pub async fn get_contrato(&self, id: i64) -> Result<Option<Contrato>, StoreError> {
        let row = sqlx::query_as::<_, ContratoRow>("SELECT * FROM contratos WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Contrato::from))
    }

    /// Insert a contract with its derived tax-inclusive amount
    pub async fn insert_contrato(
        &self,
        contrato: &NuevoContrato,
        importe_con_iva: f64,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contratos (cliente_id, codigo_contrato, anualidad,
                denominacion, importe_sin_iva, importe_con_iva)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contrato.cliente_id)
        .bind(&contrato.codigo_contrato)
        .bind(contrato.anualidad)
        .bind(&contrato.denominacion)
        .bind(contrato.importe_sin_iva)
        .bind(importe_con_iva)
        .execute(&*self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Replace all caller-settable fields of a contract
    pub async fn update_contrato(
        &self,
        id: i64,
        contrato: &NuevoContrato,
        importe_con_iva: f64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE contratos
            SET codigo_contrato = ?, anualidad = ?, denominacion = ?,
                importe_sin_iva = ?, importe_con_iva = ?
            WHERE id = ?
            "#,
        )
        .bind(&contrato.codigo_contrato)
        .bind(contrato.anualidad)
        .bind(&contrato.denominacion)
        .bind(contrato.importe_sin_iva)
        .bind(importe_con_iva)
        .bind(id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a single contract; no cascade
    pub async fn delete_contrato(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM contratos WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}
