//! Models shared by the integration suites.

use serde::{Deserialize, Serialize};
use uri_store::{GraphModel, Identity};

/// Triple-store class identified by its name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(graph = "plot", backend = "rdf")]
pub struct Plot {
    #[model(identity)]
    pub uri: Identity,
    #[model(segment)]
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Plot {
    pub fn named(name: &str) -> Self {
        Plot {
            uri: Identity::new(),
            name: Some(name.to_string()),
            description: None,
        }
    }

    pub fn described(name: &str, description: &str) -> Self {
        Plot {
            description: Some(description.to_string()),
            ..Plot::named(name)
        }
    }
}

/// Document class mirrored to the triple store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(graph = "site", backend = "document", mirror = "rdf")]
pub struct Site {
    pub uri: Identity,
    #[model(segment)]
    pub country: String,
    #[model(segment)]
    pub code: String,
    pub label: Option<String>,
}

impl Site {
    pub fn new(country: &str, code: &str) -> Self {
        Site {
            uri: Identity::new(),
            country: country.to_string(),
            code: code.to_string(),
            label: None,
        }
    }
}

/// Relational class; `created_by` survives every merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(graph = "variable", backend = "sql")]
pub struct Variable {
    pub uri: Identity,
    #[model(segment)]
    pub name: String,
    pub unit: Option<String>,
    pub rank: i64,
    #[model(keep)]
    pub created_by: Option<String>,
}

impl Variable {
    pub fn new(name: &str, unit: &str, rank: i64) -> Self {
        Variable {
            uri: Identity::new(),
            name: name.to_string(),
            unit: Some(unit.to_string()),
            rank,
            created_by: None,
        }
    }
}

/// Homonyms are distinct entities: collisions take a `-n` suffix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(graph = "observation", backend = "rdf", collision = "suffix")]
pub struct Observation {
    pub uri: Identity,
    #[model(segment)]
    pub label: String,
    pub value: Option<i64>,
}

impl Observation {
    pub fn new(label: &str, value: i64) -> Self {
        Observation {
            uri: Identity::new(),
            label: label.to_string(),
            value: Some(value),
        }
    }
}

/// Identity held in a field not named `uri`; class name from the struct name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(backend = "nosql")]
pub struct DataFile {
    #[model(identity)]
    pub id: Identity,
    #[model(segment)]
    pub path: String,
    pub size: u64,
}

/// Second class stored in the `plot` graph; identity in the default `uri` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, GraphModel)]
#[model(graph = "plot", backend = "rdf")]
pub struct PlotNote {
    pub uri: Identity,
    #[model(segment)]
    pub title: String,
    pub text: Option<String>,
}

impl PlotNote {
    pub fn new(title: &str, text: &str) -> Self {
        PlotNote {
            uri: Identity::new(),
            title: title.to_string(),
            text: Some(text.to_string()),
        }
    }
}
