use std::path::Path;

use figment::{
    providers::{Data, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// Which on-disk encoding a configuration file uses.
#[derive(Clone, Copy, Debug)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    fn name(&self) -> &'static str {
        match self {
            FileFormat::Yaml => "YAML file",
            FileFormat::Json => "JSON file",
        }
    }
}

/// A configuration file that has been read and parsed up front.
///
/// Parsing eagerly means a malformed file is reported when it is added to the loader, rather than when the merged
/// configuration is first extracted.
pub struct FileProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl FileProvider {
    pub fn load<P>(path: P, format: FileFormat) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;

        let data = match format {
            FileFormat::Yaml => Data::<Yaml>::string(&contents).data()?,
            FileFormat::Json => Data::<Json>::string(&contents).data()?,
        };

        Ok(Self {
            data,
            metadata: Metadata::from(format.name(), path),
        })
    }
}

impl Provider for FileProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
