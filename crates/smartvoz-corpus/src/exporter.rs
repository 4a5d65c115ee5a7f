//! Data exporter: knowledge-base rows to corpus documents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::fsutil;
use smartvoz_core::types::{
    Client, ClientGroup, Company, CompanyRef, Document, ServiceGroup, ServiceSummary,
};
use smartvoz_storage::KnowledgeSource;

use crate::markdown::render_protocol;

/// Entity kinds exported independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Companies,
    Clients,
    Services,
    Protocols,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Companies,
        EntityKind::Clients,
        EntityKind::Services,
        EntityKind::Protocols,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Companies => "companies",
            EntityKind::Clients => "clients",
            EntityKind::Services => "services",
            EntityKind::Protocols => "protocols",
        }
    }
}

/// One entity kind that could not be exported.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFailure {
    pub entity: EntityKind,
    pub error_kind: String,
    pub message: String,
}

/// Outcome of a full export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub corpus_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub counts: BTreeMap<EntityKind, usize>,
    pub failures: Vec<ExportFailure>,
    pub clients_aggregated: bool,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes one document per company, client (or per-company client group),
/// per-company service group and protocol.
pub struct CorpusExporter<'a> {
    source: &'a dyn KnowledgeSource,
    client_aggregation_threshold: usize,
}

impl<'a> CorpusExporter<'a> {
    pub fn new(source: &'a dyn KnowledgeSource, client_aggregation_threshold: usize) -> Self {
        Self {
            source,
            client_aggregation_threshold,
        }
    }

    pub fn from_config(source: &'a dyn KnowledgeSource, config: &SmartvozConfig) -> Self {
        Self::new(source, config.corpus.client_aggregation_threshold)
    }

    pub fn export_companies(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let companies = self.source.companies()?;
        let mut paths = Vec::with_capacity(companies.len());
        for company in companies {
            paths.push(write_document(dir, &Document::Company(company))?);
        }
        info!(count = paths.len(), "Exported companies");
        Ok(paths)
    }

    /// Export clients, one file each, or grouped per company when the row
    /// count exceeds the aggregation threshold. The threshold is compared
    /// with the rows as read, before unresolved clients are dropped.
    ///
    /// Company references that do not resolve to an exported company are
    /// dropped, and a client left without any reference is skipped.
    pub fn export_clients(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.export_clients_inner(dir).map(|(paths, _)| paths)
    }

    fn export_clients_inner(&self, dir: &Path) -> Result<(Vec<PathBuf>, bool)> {
        fs::create_dir_all(dir)?;
        let companies = self.source.companies().map_err(|e| {
            SmartvozError::data_integrity(
                "clients",
                format!("cannot verify company references: {}", e),
            )
        })?;
        let known: HashSet<&str> = companies.iter().map(|c| c.id.as_str()).collect();

        let rows = self.source.clients()?;
        let row_count = rows.len();
        let mut clients = Vec::with_capacity(row_count);
        for mut client in rows {
            let before = client.companies.len();
            client.companies.retain(|c| known.contains(c.id.as_str()));
            if client.companies.len() != before {
                warn!(
                    client_id = %client.id,
                    dropped = before - client.companies.len(),
                    "Client references unknown companies"
                );
            }
            if client.companies.is_empty() {
                warn!(client_id = %client.id, "Skipping client without a known company");
                continue;
            }
            clients.push(client);
        }

        let aggregate = row_count > self.client_aggregation_threshold;
        let mut paths = Vec::new();
        if aggregate {
            for group in group_clients(&companies, clients) {
                paths.push(write_document(dir, &Document::ClientGroup(group))?);
            }
            info!(
                groups = paths.len(),
                rows = row_count,
                threshold = self.client_aggregation_threshold,
                "Exported clients grouped per company"
            );
        } else {
            for client in clients {
                paths.push(write_document(dir, &Document::Client(client))?);
            }
            info!(count = paths.len(), "Exported clients");
        }
        Ok((paths, aggregate))
    }

    /// Export services as one document per owning company.
    pub fn export_services(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let services = self.source.services()?;

        let mut order: Vec<CompanyRef> = Vec::new();
        let mut grouped: HashMap<String, Vec<ServiceSummary>> = HashMap::new();
        for service in services {
            let entry = grouped.entry(service.company.id.clone()).or_insert_with(|| {
                order.push(service.company.clone());
                Vec::new()
            });
            entry.push(ServiceSummary {
                service_id: service.id,
                name: service.name,
                description: service.description,
            });
        }

        let mut paths = Vec::with_capacity(order.len());
        for company in order {
            let services = grouped.remove(&company.id).unwrap_or_default();
            paths.push(write_document(
                dir,
                &Document::ServiceGroup(ServiceGroup { company, services }),
            )?);
        }
        info!(groups = paths.len(), "Exported services");
        Ok(paths)
    }

    pub fn export_protocols(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let protocols = self.source.protocols()?;
        let mut paths = Vec::with_capacity(protocols.len());
        for mut protocol in protocols {
            protocol.sort_steps();
            paths.push(write_document(dir, &Document::Protocol(protocol))?);
        }
        info!(count = paths.len(), "Exported protocols");
        Ok(paths)
    }

    /// Export every entity kind into a fresh staging directory and swap it
    /// over `corpus_dir`.
    ///
    /// A kind that fails is logged and reported; the others still land. If
    /// every kind fails the previous corpus is left untouched and the call
    /// returns an error.
    pub fn export_all(&self, corpus_dir: &Path) -> Result<ExportReport> {
        let staging = fsutil::prepare_staging(corpus_dir)?;

        let mut files = Vec::new();
        let mut counts = BTreeMap::new();
        let mut failures = Vec::new();
        let mut clients_aggregated = false;

        for entity in EntityKind::ALL {
            let result = match entity {
                EntityKind::Companies => self.export_companies(&staging),
                EntityKind::Clients => self.export_clients_inner(&staging).map(|(p, agg)| {
                    clients_aggregated = agg;
                    p
                }),
                EntityKind::Services => self.export_services(&staging),
                EntityKind::Protocols => self.export_protocols(&staging),
            };
            match result {
                Ok(paths) => {
                    counts.insert(entity, paths.len());
                    files.extend(
                        paths
                            .iter()
                            .filter_map(|p| p.file_name())
                            .map(|name| corpus_dir.join(name)),
                    );
                }
                Err(e) => {
                    error!(entity = entity.as_str(), error = %e, "Export failed");
                    failures.push(ExportFailure {
                        entity,
                        error_kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if failures.len() == EntityKind::ALL.len() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory: {}", e);
            }
            let reasons = failures
                .iter()
                .map(|f| format!("{}: {}", f.entity.as_str(), f.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SmartvozError::data_integrity("corpus", reasons));
        }

        fsutil::swap_dir(&staging, corpus_dir)?;
        info!(
            files = files.len(),
            failed_kinds = failures.len(),
            "Corpus exported to {}",
            corpus_dir.display()
        );

        Ok(ExportReport {
            corpus_dir: corpus_dir.to_path_buf(),
            files,
            counts,
            failures,
            clients_aggregated,
        })
    }
}

/// Group clients per company, following the company order. A client linked
/// to several companies appears in each of their groups.
fn group_clients(companies: &[Company], clients: Vec<Client>) -> Vec<ClientGroup> {
    let mut by_company: HashMap<String, Vec<Client>> = HashMap::new();
    for client in clients {
        for company in &client.companies {
            by_company
                .entry(company.id.clone())
                .or_default()
                .push(client.clone());
        }
    }

    companies
        .iter()
        .filter_map(|company| {
            by_company.remove(&company.id).map(|clients| ClientGroup {
                company: company.as_ref(),
                clients,
            })
        })
        .collect()
}

fn write_document(dir: &Path, doc: &Document) -> Result<PathBuf> {
    let path = dir.join(doc.file_name());
    let content = match doc {
        Document::Protocol(p) => render_protocol(p),
        other => serde_json::to_string_pretty(other)?,
    };
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartvoz_core::types::{Protocol, ProtocolStep, Service};

    /// In-memory source; `failing` names the kinds whose query errors.
    #[derive(Default)]
    struct StaticSource {
        companies: Vec<Company>,
        clients: Vec<Client>,
        services: Vec<Service>,
        protocols: Vec<Protocol>,
        failing: Vec<EntityKind>,
    }

    impl StaticSource {
        fn check(&self, kind: EntityKind) -> Result<()> {
            if self.failing.contains(&kind) {
                Err(SmartvozError::data_integrity(
                    kind.as_str(),
                    format!("no such table: {}", kind.as_str()),
                ))
            } else {
                Ok(())
            }
        }
    }

    impl KnowledgeSource for StaticSource {
        fn companies(&self) -> Result<Vec<Company>> {
            self.check(EntityKind::Companies)?;
            Ok(self.companies.clone())
        }
        fn clients(&self) -> Result<Vec<Client>> {
            self.check(EntityKind::Clients)?;
            Ok(self.clients.clone())
        }
        fn services(&self) -> Result<Vec<Service>> {
            self.check(EntityKind::Services)?;
            Ok(self.services.clone())
        }
        fn protocols(&self) -> Result<Vec<Protocol>> {
            self.check(EntityKind::Protocols)?;
            Ok(self.protocols.clone())
        }
    }

    fn company(id: &str, name: &str) -> Company {
        Company {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn source_with_clients(n: usize) -> StaticSource {
        let companies = vec![company("1", "Publicarte"), company("2", "Andes Logistica")];
        let clients = (0..n)
            .map(|i| Client {
                id: i.to_string(),
                name: format!("Cliente {}", i),
                companies: vec![companies[i % 2].as_ref()],
                ..Default::default()
            })
            .collect();
        StaticSource {
            companies,
            clients,
            ..Default::default()
        }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_999_clients_export_one_file_each() {
        let source = source_with_clients(999);
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 1000)
            .export_clients(dir.path())
            .unwrap();
        assert_eq!(paths.len(), 999);
        assert!(file_names(&paths).iter().all(|n| n.starts_with("client_")));
    }

    #[test]
    fn test_1001_clients_export_grouped_per_company() {
        let source = source_with_clients(1001);
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 1000)
            .export_clients(dir.path())
            .unwrap();
        assert_eq!(
            file_names(&paths),
            vec!["clients_company_1.json", "clients_company_2.json"]
        );

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["type"], "client_group");
        assert_eq!(json["company"]["name"], "Publicarte");
        assert_eq!(json["clients"].as_array().unwrap().len(), 501);
    }

    #[test]
    fn test_client_in_two_companies_appears_in_both_groups() {
        let mut source = source_with_clients(3);
        source.clients[0].companies = vec![
            source.companies[0].as_ref(),
            source.companies[1].as_ref(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 2)
            .export_clients(dir.path())
            .unwrap();
        for path in &paths {
            let content = fs::read_to_string(path).unwrap();
            assert!(content.contains("\"Cliente 0\""));
        }
    }

    #[test]
    fn test_client_references_resolve_to_exported_companies() {
        let mut source = source_with_clients(4);
        source.clients[3].companies = vec![CompanyRef {
            id: "99".to_string(),
            name: "Fantasma".to_string(),
        }];
        let dir = tempfile::tempdir().unwrap();
        let report = CorpusExporter::new(&source, 1000)
            .export_all(&dir.path().join("kb"))
            .unwrap();

        let docs = crate::reader::read_corpus(&report.corpus_dir).unwrap();
        let companies: HashSet<(String, String)> = docs
            .iter()
            .filter_map(|d| match &d.document {
                Document::Company(c) => Some((c.id.clone(), c.name.clone())),
                _ => None,
            })
            .collect();
        let mut client_docs = 0;
        for doc in &docs {
            if let Document::Client(client) = &doc.document {
                client_docs += 1;
                for r in &client.companies {
                    assert!(companies.contains(&(r.id.clone(), r.name.clone())));
                }
            }
        }
        assert_eq!(client_docs, 3);
    }

    #[test]
    fn test_threshold_counts_rows_before_dropping_unresolved() {
        let mut source = source_with_clients(1001);
        for client in source.clients.iter_mut().take(2) {
            client.companies = vec![CompanyRef {
                id: "99".to_string(),
                name: "Fantasma".to_string(),
            }];
        }
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 1000)
            .export_clients(dir.path())
            .unwrap();
        assert_eq!(
            file_names(&paths),
            vec!["clients_company_1.json", "clients_company_2.json"]
        );
        let grouped: usize = paths
            .iter()
            .map(|p| {
                let json: serde_json::Value =
                    serde_json::from_str(&fs::read_to_string(p).unwrap()).unwrap();
                json["clients"].as_array().unwrap().len()
            })
            .sum();
        assert_eq!(grouped, 999);
    }

    #[test]
    fn test_group_references_resolve_to_exported_companies() {
        let mut source = source_with_clients(6);
        source.clients[5].companies = vec![CompanyRef {
            id: "99".to_string(),
            name: "Fantasma".to_string(),
        }];
        source.clients[4].companies.push(CompanyRef {
            id: "98".to_string(),
            name: "Otra Fantasma".to_string(),
        });
        let dir = tempfile::tempdir().unwrap();
        let report = CorpusExporter::new(&source, 3)
            .export_all(&dir.path().join("kb"))
            .unwrap();
        assert!(report.clients_aggregated);

        let docs = crate::reader::read_corpus(&report.corpus_dir).unwrap();
        let companies: HashSet<(String, String)> = docs
            .iter()
            .filter_map(|d| match &d.document {
                Document::Company(c) => Some((c.id.clone(), c.name.clone())),
                _ => None,
            })
            .collect();
        let mut members = HashSet::new();
        for doc in &docs {
            match &doc.document {
                Document::ClientGroup(group) => {
                    let owner = (group.company.id.clone(), group.company.name.clone());
                    assert!(companies.contains(&owner));
                    for client in &group.clients {
                        assert!(client.companies.iter().any(|r| r.id == group.company.id));
                        for r in &client.companies {
                            assert!(companies.contains(&(r.id.clone(), r.name.clone())));
                        }
                        members.insert(client.id.clone());
                    }
                }
                Document::Client(_) => panic!("clients must be grouped above the threshold"),
                _ => {}
            }
        }
        let expected: HashSet<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(members, expected);
    }

    #[test]
    fn test_services_grouped_per_company() {
        let publicarte = company("1", "Publicarte");
        let source = StaticSource {
            companies: vec![publicarte.clone()],
            services: vec![
                Service {
                    id: "s1".to_string(),
                    name: "Vallas".to_string(),
                    description: "Alquiler".to_string(),
                    company: publicarte.as_ref(),
                },
                Service {
                    id: "s2".to_string(),
                    name: "Diseno".to_string(),
                    description: "Piezas graficas".to_string(),
                    company: publicarte.as_ref(),
                },
            ],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 1000)
            .export_services(dir.path())
            .unwrap();
        assert_eq!(file_names(&paths), vec!["services_company_1.json"]);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["type"], "service_group");
        assert_eq!(json["services"][1]["service_id"], "s2");
    }

    #[test]
    fn test_protocols_written_as_markdown() {
        let source = StaticSource {
            protocols: vec![Protocol {
                id: "4".to_string(),
                name: "Envio demorado".to_string(),
                steps: vec![
                    ProtocolStep { code: 2, text: "Consultar rastreo".to_string() },
                    ProtocolStep { code: 1, text: "Pedir codigo".to_string() },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusExporter::new(&source, 1000)
            .export_protocols(dir.path())
            .unwrap();
        assert_eq!(file_names(&paths), vec!["protocol_4.md"]);
        let content = fs::read_to_string(&paths[0]).unwrap();
        assert!(content.contains("## Steps\n1. Pedir codigo\n2. Consultar rastreo"));
    }

    #[test]
    fn test_failed_kind_does_not_abort_others() {
        let mut source = source_with_clients(2);
        source.protocols.push(Protocol {
            id: "1".to_string(),
            name: "Reinicio".to_string(),
            ..Default::default()
        });
        source.failing = vec![EntityKind::Services];

        let dir = tempfile::tempdir().unwrap();
        let report = CorpusExporter::new(&source, 1000)
            .export_all(&dir.path().join("kb"))
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, EntityKind::Services);
        assert_eq!(report.failures[0].error_kind, "DataIntegrityError");
        assert_eq!(report.counts.get(&EntityKind::Companies), Some(&2));
        assert_eq!(report.counts.get(&EntityKind::Clients), Some(&2));
        assert_eq!(report.counts.get(&EntityKind::Protocols), Some(&1));
        assert!(report.files.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_export_all_supersedes_previous_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("kb");

        let first = source_with_clients(3);
        CorpusExporter::new(&first, 1000).export_all(&corpus).unwrap();
        assert!(corpus.join("client_2.json").exists());

        let second = source_with_clients(1);
        let report = CorpusExporter::new(&second, 1000).export_all(&corpus).unwrap();
        assert!(!corpus.join("client_2.json").exists());
        assert_eq!(fs::read_dir(&corpus).unwrap().count(), report.files.len());
    }

    #[test]
    fn test_all_kinds_failing_keeps_previous_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("kb");
        CorpusExporter::new(&source_with_clients(1), 1000)
            .export_all(&corpus)
            .unwrap();

        let broken = StaticSource {
            failing: EntityKind::ALL.to_vec(),
            ..Default::default()
        };
        let err = CorpusExporter::new(&broken, 1000)
            .export_all(&corpus)
            .unwrap_err();
        assert_eq!(err.kind(), "DataIntegrityError");
        assert!(corpus.join("company_1.json").exists());
    }
}
