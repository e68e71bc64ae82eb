//! Offline country lookup for exit IPs using a MaxMind MMDB database

use crate::Result;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Country information for an IP address
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeoCountry {
    /// ISO 3166-1 alpha-2 code (e.g. "US")
    pub iso_code: Option<String>,
    /// English country name
    pub name: Option<String>,
}

impl GeoCountry {
    /// Preferred display value: the English name, else the ISO code
    pub fn display(&self) -> Option<String> {
        self.name.clone().or_else(|| self.iso_code.clone())
    }
}

/// Shared, cheaply cloneable MMDB reader
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up the country of an IP given as text
    pub fn country(&self, ip_str: &str) -> Result<GeoCountry> {
        let ip: IpAddr = ip_str.trim().parse()?;
        self.country_of(ip)
    }

    pub fn country_of(&self, ip: IpAddr) -> Result<GeoCountry> {
        let lookup_result = self.reader.lookup(ip)?;
        // City records carry the country block and decode from country-only databases too.
        let record: Option<geoip2::City> = lookup_result.decode()?;

        let Some(record) = record else {
            return Ok(GeoCountry::default());
        };

        Ok(GeoCountry {
            iso_code: record.country.iso_code.map(String::from),
            name: record.country.names.english.map(String::from),
        })
    }
}

impl std::fmt::Debug for GeoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoLocator").finish_non_exhaustive()
    }
}
