//! Read access to the knowledge base for the corpus exporter, plus the
//! insert helpers used to seed it.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::{Client, Company, CompanyRef, Protocol, ProtocolStep, Reason, Service};

use crate::db::Database;

/// Source of the relational records the exporter turns into documents.
///
/// Each method is one table query. A failing query is reported as
/// [`SmartvozError::DataIntegrity`] naming the entity kind, so the exporter
/// can log it and continue with the other kinds.
pub trait KnowledgeSource: Send + Sync {
    fn companies(&self) -> Result<Vec<Company>>;

    /// Clients with every associated company inlined.
    fn clients(&self) -> Result<Vec<Client>>;

    fn services(&self) -> Result<Vec<Service>>;

    /// Protocols with their reason and steps ordered ascending by code.
    fn protocols(&self) -> Result<Vec<Protocol>>;
}

/// SQLite-backed [`KnowledgeSource`].
#[derive(Debug, Clone)]
pub struct SqliteKnowledgeSource {
    db: Arc<Database>,
}

fn integrity(entity: &'static str) -> impl Fn(rusqlite::Error) -> SmartvozError {
    move |e| SmartvozError::data_integrity(entity, e)
}

fn storage(e: rusqlite::Error) -> SmartvozError {
    SmartvozError::Storage(e.to_string())
}

impl SqliteKnowledgeSource {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn insert_company(&self, company: &Company) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO companies (company_id, name, phone, email, city, address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    company.id,
                    company.name,
                    company.phone,
                    company.email,
                    company.city,
                    company.address,
                ],
            )
            .map_err(storage)?;
            Ok(())
        })
    }

    /// Insert a client and link it to each company it references. The
    /// referenced companies must already exist.
    pub fn insert_client(&self, client: &Client) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage)?;
            tx.execute(
                "INSERT INTO clients (client_id, name, national_id, email, phone, address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    client.id,
                    client.name,
                    client.national_id,
                    client.email,
                    client.phone,
                    client.address,
                ],
            )
            .map_err(storage)?;
            for company in &client.companies {
                tx.execute(
                    "INSERT INTO client_companies (client_id, company_id) VALUES (?1, ?2)",
                    rusqlite::params![client.id, company.id],
                )
                .map_err(|e| {
                    SmartvozError::Storage(format!(
                        "Client {} references company {}: {}",
                        client.id, company.id, e
                    ))
                })?;
            }
            tx.commit().map_err(storage)?;
            Ok(())
        })
    }

    pub fn insert_service(&self, service: &Service) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO services (service_id, company_id, name, description)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    service.id,
                    service.company.id,
                    service.name,
                    service.description,
                ],
            )
            .map_err(storage)?;
            Ok(())
        })
    }

    /// Insert a protocol with its steps. A reason that is not stored yet is
    /// inserted as well.
    pub fn insert_protocol(&self, protocol: &Protocol) -> Result<()> {
        let options = serde_json::to_string(&protocol.resolution_options)?;
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage)?;
            if let Some(reason) = &protocol.reason {
                tx.execute(
                    "INSERT OR IGNORE INTO reasons (reason_id, code, name, description)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![reason.id, reason.code, reason.name, reason.description],
                )
                .map_err(storage)?;
            }
            tx.execute(
                "INSERT INTO protocols (protocol_id, name, description, reason_id, resolution_options, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    protocol.id,
                    protocol.name,
                    protocol.description,
                    protocol.reason.as_ref().map(|r| r.id.as_str()),
                    options,
                    protocol.notes,
                ],
            )
            .map_err(storage)?;
            for step in &protocol.steps {
                tx.execute(
                    "INSERT INTO protocol_steps (protocol_id, step_code, text) VALUES (?1, ?2, ?3)",
                    rusqlite::params![protocol.id, step.code, step.text],
                )
                .map_err(storage)?;
            }
            tx.commit().map_err(storage)?;
            Ok(())
        })
    }
}

impl KnowledgeSource for SqliteKnowledgeSource {
    fn companies(&self) -> Result<Vec<Company>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT company_id, name, phone, email, city, address
                     FROM companies ORDER BY company_id",
                )
                .map_err(integrity("companies"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        email: row.get(3)?,
                        city: row.get(4)?,
                        address: row.get(5)?,
                    })
                })
                .map_err(integrity("companies"))?;

            let mut companies = Vec::new();
            for row in rows {
                companies.push(row.map_err(integrity("companies"))?);
            }
            debug!(count = companies.len(), "Loaded companies");
            Ok(companies)
        })
    }

    fn clients(&self) -> Result<Vec<Client>> {
        self.db.with_conn(|conn| {
            let mut links = client_company_links(conn)?;

            let mut stmt = conn
                .prepare(
                    "SELECT client_id, name, national_id, email, phone, address
                     FROM clients ORDER BY client_id",
                )
                .map_err(integrity("clients"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Client {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        national_id: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                        address: row.get(5)?,
                        companies: Vec::new(),
                    })
                })
                .map_err(integrity("clients"))?;

            let mut clients = Vec::new();
            for row in rows {
                let mut client = row.map_err(integrity("clients"))?;
                client.companies = links.remove(&client.id).unwrap_or_default();
                clients.push(client);
            }
            debug!(count = clients.len(), "Loaded clients");
            Ok(clients)
        })
    }

    fn services(&self) -> Result<Vec<Service>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT s.service_id, s.name, s.description, c.company_id, c.name
                     FROM services s
                     JOIN companies c ON c.company_id = s.company_id
                     ORDER BY c.company_id, s.service_id",
                )
                .map_err(integrity("services"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Service {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        company: CompanyRef {
                            id: row.get(3)?,
                            name: row.get(4)?,
                        },
                    })
                })
                .map_err(integrity("services"))?;

            let mut services = Vec::new();
            for row in rows {
                services.push(row.map_err(integrity("services"))?);
            }
            debug!(count = services.len(), "Loaded services");
            Ok(services)
        })
    }

    fn protocols(&self) -> Result<Vec<Protocol>> {
        self.db.with_conn(|conn| {
            let mut steps = protocol_steps(conn)?;

            let mut stmt = conn
                .prepare(
                    "SELECT p.protocol_id, p.name, p.description, p.resolution_options, p.notes,
                            r.reason_id, r.code, r.name, r.description
                     FROM protocols p
                     LEFT JOIN reasons r ON r.reason_id = p.reason_id
                     ORDER BY p.protocol_id",
                )
                .map_err(integrity("protocols"))?;
            let rows = stmt
                .query_map([], |row| {
                    let reason_id: Option<String> = row.get(5)?;
                    let reason = match reason_id {
                        Some(id) => Some(Reason {
                            id,
                            code: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                            name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                            description: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                        }),
                        None => None,
                    };
                    let options: String = row.get(3)?;
                    Ok((
                        Protocol {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            reason,
                            steps: Vec::new(),
                            resolution_options: Vec::new(),
                            notes: row.get(4)?,
                        },
                        options,
                    ))
                })
                .map_err(integrity("protocols"))?;

            let mut protocols = Vec::new();
            for row in rows {
                let (mut protocol, options) = row.map_err(integrity("protocols"))?;
                protocol.resolution_options = serde_json::from_str(&options).map_err(|e| {
                    SmartvozError::data_integrity(
                        "protocols",
                        format!("protocol {} resolution options: {}", protocol.id, e),
                    )
                })?;
                protocol.steps = steps.remove(&protocol.id).unwrap_or_default();
                protocol.sort_steps();
                protocols.push(protocol);
            }
            debug!(count = protocols.len(), "Loaded protocols");
            Ok(protocols)
        })
    }
}

fn client_company_links(conn: &Connection) -> Result<HashMap<String, Vec<CompanyRef>>> {
    let mut stmt = conn
        .prepare(
            "SELECT cc.client_id, c.company_id, c.name
             FROM client_companies cc
             JOIN companies c ON c.company_id = cc.company_id
             ORDER BY cc.client_id, c.company_id",
        )
        .map_err(integrity("clients"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                CompanyRef {
                    id: row.get(1)?,
                    name: row.get(2)?,
                },
            ))
        })
        .map_err(integrity("clients"))?;

    let mut links: HashMap<String, Vec<CompanyRef>> = HashMap::new();
    for row in rows {
        let (client_id, company) = row.map_err(integrity("clients"))?;
        links.entry(client_id).or_default().push(company);
    }
    Ok(links)
}

fn protocol_steps(conn: &Connection) -> Result<HashMap<String, Vec<ProtocolStep>>> {
    let mut stmt = conn
        .prepare(
            "SELECT protocol_id, step_code, text FROM protocol_steps
             ORDER BY protocol_id, step_code ASC",
        )
        .map_err(integrity("protocols"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ProtocolStep {
                    code: row.get(1)?,
                    text: row.get(2)?,
                },
            ))
        })
        .map_err(integrity("protocols"))?;

    let mut steps: HashMap<String, Vec<ProtocolStep>> = HashMap::new();
    for row in rows {
        let (protocol_id, step) = row.map_err(integrity("protocols"))?;
        steps.entry(protocol_id).or_default().push(step);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SqliteKnowledgeSource {
        SqliteKnowledgeSource::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn company(id: &str, name: &str) -> Company {
        Company {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clients_inline_all_companies() {
        let src = source();
        let publicarte = company("1", "Publicarte");
        let andes = company("2", "Andes Logistica");
        src.insert_company(&publicarte).unwrap();
        src.insert_company(&andes).unwrap();
        src.insert_client(&Client {
            id: "10".to_string(),
            name: "Jorge Urioste".to_string(),
            companies: vec![publicarte.as_ref(), andes.as_ref()],
            ..Default::default()
        })
        .unwrap();

        let clients = src.clients().unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "Jorge Urioste");
        let names: Vec<&str> = clients[0].companies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Publicarte", "Andes Logistica"]);
    }

    #[test]
    fn test_client_with_unknown_company_rejected() {
        let src = source();
        let result = src.insert_client(&Client {
            id: "10".to_string(),
            name: "Ana Perez".to_string(),
            companies: vec![CompanyRef {
                id: "404".to_string(),
                name: "Ghost".to_string(),
            }],
            ..Default::default()
        });
        assert!(result.is_err());
        // The transaction rolled back the client row as well.
        assert!(src.clients().unwrap().is_empty());
    }

    #[test]
    fn test_services_carry_company() {
        let src = source();
        let publicarte = company("1", "Publicarte");
        src.insert_company(&publicarte).unwrap();
        src.insert_service(&Service {
            id: "s1".to_string(),
            name: "Vallas publicitarias".to_string(),
            description: "Alquiler de vallas".to_string(),
            company: publicarte.as_ref(),
        })
        .unwrap();

        let services = src.services().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].company, publicarte.as_ref());
    }

    #[test]
    fn test_protocol_steps_sorted_and_reason_joined() {
        let src = source();
        src.insert_protocol(&Protocol {
            id: "p1".to_string(),
            name: "Reinicio de router".to_string(),
            description: "Sin conexion a internet".to_string(),
            reason: Some(Reason {
                id: "r1".to_string(),
                code: "NET".to_string(),
                name: "Sin internet".to_string(),
                description: "El cliente no tiene conexion".to_string(),
            }),
            steps: vec![
                ProtocolStep { code: 20, text: "Esperar dos minutos".to_string() },
                ProtocolStep { code: 10, text: "Desconectar el router".to_string() },
                ProtocolStep { code: 30, text: "Conectar el router".to_string() },
            ],
            resolution_options: vec!["Visita tecnica".to_string()],
            notes: String::new(),
        })
        .unwrap();

        let protocols = src.protocols().unwrap();
        assert_eq!(protocols.len(), 1);
        let p = &protocols[0];
        let codes: Vec<u32> = p.steps.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![10, 20, 30]);
        assert_eq!(p.reason.as_ref().map(|r| r.code.as_str()), Some("NET"));
        assert_eq!(p.resolution_options, vec!["Visita tecnica".to_string()]);
    }

    #[test]
    fn test_protocol_without_reason() {
        let src = source();
        src.insert_protocol(&Protocol {
            id: "p2".to_string(),
            name: "Cambio de clave".to_string(),
            ..Default::default()
        })
        .unwrap();
        let protocols = src.protocols().unwrap();
        assert!(protocols[0].reason.is_none());
        assert!(protocols[0].steps.is_empty());
    }

    #[test]
    fn test_failing_table_query_is_data_integrity() {
        let src = source();
        src.database()
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE services;")
                    .map_err(|e| SmartvozError::Storage(e.to_string()))
            })
            .unwrap();

        let err = src.services().unwrap_err();
        assert_eq!(err.kind(), "DataIntegrityError");
        // Other kinds are unaffected.
        assert!(src.companies().is_ok());
    }
}
