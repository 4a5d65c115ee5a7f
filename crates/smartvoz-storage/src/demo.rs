//! Small demonstration data set for local runs and end-to-end tests.

use serde::Serialize;
use tracing::info;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::{Client, Company, Protocol, ProtocolStep, Reason, Service};

use crate::knowledge::{KnowledgeSource, SqliteKnowledgeSource};

/// Number of rows inserted per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub companies: usize,
    pub clients: usize,
    pub services: usize,
    pub protocols: usize,
}

fn company(id: &str, name: &str, city: &str, phone: &str, email: &str) -> Company {
    Company {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        email: email.to_string(),
        city: city.to_string(),
        address: String::new(),
    }
}

fn steps(texts: &[&str]) -> Vec<ProtocolStep> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| ProtocolStep {
            code: (i as u32 + 1) * 10,
            text: t.to_string(),
        })
        .collect()
}

/// Fill an empty knowledge base with the demo data set.
pub fn seed_demo(source: &SqliteKnowledgeSource) -> Result<SeedSummary> {
    if !source.companies()?.is_empty() {
        return Err(SmartvozError::Storage(
            "knowledge base already contains companies; refusing to seed".to_string(),
        ));
    }

    let publicarte = company("1", "Publicarte", "Montevideo", "+598 2900 1234", "contacto@publicarte.uy");
    let andes = company("2", "Andes Logistica", "Santiago", "+56 2 2345 6789", "soporte@andeslog.cl");
    let rio = company("3", "Rio Telecom", "Asuncion", "+595 21 555 000", "ayuda@riotelecom.py");
    let companies = [&publicarte, &andes, &rio];

    let clients = vec![
        Client {
            id: "100".to_string(),
            name: "Jorge Urioste".to_string(),
            companies: vec![publicarte.as_ref()],
            national_id: "4.512.331-2".to_string(),
            email: "jurioste@publicarte.uy".to_string(),
            phone: "+598 99 123 456".to_string(),
            address: "Av. 18 de Julio 1234".to_string(),
        },
        Client {
            id: "101".to_string(),
            name: "Maria Fernanda Lopez".to_string(),
            companies: vec![andes.as_ref(), rio.as_ref()],
            email: "mflopez@andeslog.cl".to_string(),
            ..Default::default()
        },
        Client {
            id: "102".to_string(),
            name: "Carlos Benitez".to_string(),
            companies: vec![rio.as_ref()],
            phone: "+595 981 222 333".to_string(),
            ..Default::default()
        },
    ];

    let services = vec![
        Service {
            id: "s1".to_string(),
            name: "Vallas publicitarias".to_string(),
            description: "Alquiler y mantenimiento de vallas en via publica".to_string(),
            company: publicarte.as_ref(),
        },
        Service {
            id: "s2".to_string(),
            name: "Diseno grafico".to_string(),
            description: "Diseno de piezas para campanas".to_string(),
            company: publicarte.as_ref(),
        },
        Service {
            id: "s3".to_string(),
            name: "Seguimiento de envios".to_string(),
            description: "Rastreo en linea de cargas nacionales".to_string(),
            company: andes.as_ref(),
        },
        Service {
            id: "s4".to_string(),
            name: "Internet hogar".to_string(),
            description: "Fibra optica residencial".to_string(),
            company: rio.as_ref(),
        },
    ];

    let protocols = vec![
        Protocol {
            id: "1".to_string(),
            name: "Sin conexion a internet".to_string(),
            description: "El cliente no tiene conexion a internet o el router no enciende la luz de red"
                .to_string(),
            reason: Some(Reason {
                id: "r1".to_string(),
                code: "NET-01".to_string(),
                name: "Falla de conectividad".to_string(),
                description: "Perdida total del servicio de internet".to_string(),
            }),
            steps: steps(&[
                "Verificar que el router este enchufado y encendido",
                "Apagar el router y esperar treinta segundos",
                "Encender el router y esperar dos minutos",
                "Comprobar si la luz de internet esta verde",
            ]),
            resolution_options: vec![
                "Agendar visita tecnica".to_string(),
                "Reemplazo de router".to_string(),
            ],
            notes: "Si persiste, escalar a soporte de red.".to_string(),
        },
        Protocol {
            id: "2".to_string(),
            name: "Factura con cobro duplicado".to_string(),
            description: "El cliente reporta un cobro repetido en su factura mensual".to_string(),
            reason: Some(Reason {
                id: "r2".to_string(),
                code: "BIL-02".to_string(),
                name: "Reclamo de facturacion".to_string(),
                description: "Diferencias en montos facturados".to_string(),
            }),
            steps: steps(&[
                "Confirmar el numero de factura",
                "Revisar los movimientos del mes",
                "Registrar el reclamo de devolucion",
            ]),
            resolution_options: vec!["Nota de credito en la proxima factura".to_string()],
            notes: String::new(),
        },
        Protocol {
            id: "3".to_string(),
            name: "Envio demorado".to_string(),
            description: "Un envio no llego en la fecha comprometida".to_string(),
            reason: None,
            steps: steps(&[
                "Solicitar el codigo de seguimiento",
                "Consultar el estado en el sistema de rastreo",
                "Informar la nueva fecha estimada",
            ]),
            resolution_options: Vec::new(),
            notes: String::new(),
        },
    ];

    for c in companies {
        source.insert_company(c)?;
    }
    for c in &clients {
        source.insert_client(c)?;
    }
    for s in &services {
        source.insert_service(s)?;
    }
    for p in &protocols {
        source.insert_protocol(p)?;
    }

    let summary = SeedSummary {
        companies: companies.len(),
        clients: clients.len(),
        services: services.len(),
        protocols: protocols.len(),
    };
    info!(?summary, "Demo knowledge base seeded");
    Ok(summary)
}
