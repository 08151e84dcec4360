//! Map projection of a WRF domain, derived from the model's global
//! attributes and carried through the pipeline as a PROJ.4 string.

use crate::data_io::Attributes;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrsError {
    #[error("Missing projection attribute: {0}")]
    MissingAttribute(String),

    #[error("Unsupported WRF map projection MAP_PROJ={0}")]
    UnsupportedProjection(i64),

    #[error("Invalid PROJ.4 string '{0}'")]
    InvalidProj4(String),
}

/// Projection families WRF can run on (`MAP_PROJ` 1, 2, 3 and 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    LambertConformal,
    PolarStereographic,
    Mercator,
    LatLon,
}

impl Projection {
    pub fn from_map_proj(code: i64) -> Result<Self, CrsError> {
        match code {
            1 => Ok(Projection::LambertConformal),
            2 => Ok(Projection::PolarStereographic),
            3 => Ok(Projection::Mercator),
            6 => Ok(Projection::LatLon),
            other => Err(CrsError::UnsupportedProjection(other)),
        }
    }

    fn proj_name(&self) -> &'static str {
        match self {
            Projection::LambertConformal => "lcc",
            Projection::PolarStereographic => "stere",
            Projection::Mercator => "merc",
            Projection::LatLon => "latlong",
        }
    }
}

/// Parameters of the domain's coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub struct CrsDescriptor {
    pub projection: Projection,
    /// `STAND_LON`
    pub central_longitude: f64,
    /// `MOAD_CEN_LAT`; the pole (+/-90) for polar stereographic
    pub central_latitude: f64,
    /// `TRUELAT1`, `TRUELAT2`
    pub standard_parallels: (f64, f64),
    /// Sphere radius (m)
    pub radius: f64,
}

impl CrsDescriptor {
    /// Build the descriptor from WRF global attributes
    pub fn from_wrf_attributes(attrs: &Attributes, radius: f64) -> Result<Self, CrsError> {
        let get = |key: &str| {
            attrs
                .get(key)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| CrsError::MissingAttribute(key.to_string()))
        };

        let projection = Projection::from_map_proj(get("MAP_PROJ")? as i64)?;
        let central_longitude = get("STAND_LON")?;
        let truelat1 = get("TRUELAT1")?;
        let truelat2 = get("TRUELAT2").unwrap_or(truelat1);
        let central_latitude = match projection {
            Projection::PolarStereographic => 90f64.copysign(truelat1),
            _ => get("MOAD_CEN_LAT").or_else(|_| get("CEN_LAT"))?,
        };

        Ok(Self {
            projection,
            central_longitude,
            central_latitude,
            standard_parallels: (truelat1, truelat2),
            radius,
        })
    }

    pub fn to_proj4(&self) -> String {
        let mut parts = vec![format!("+proj={}", self.projection.proj_name())];
        if self.projection != Projection::LatLon {
            parts.push("+units=m".to_string());
        }
        parts.push(format!("+a={}", self.radius));
        parts.push(format!("+b={}", self.radius));
        let (lat_1, lat_2) = self.standard_parallels;
        match self.projection {
            Projection::LambertConformal => {
                parts.push(format!("+lat_1={}", lat_1));
                parts.push(format!("+lat_2={}", lat_2));
                parts.push(format!("+lat_0={}", self.central_latitude));
                parts.push(format!("+lon_0={}", self.central_longitude));
            }
            Projection::PolarStereographic => {
                parts.push(format!("+lat_0={}", self.central_latitude));
                parts.push(format!("+lon_0={}", self.central_longitude));
                parts.push(format!("+lat_ts={}", lat_1));
            }
            Projection::Mercator => {
                parts.push(format!("+lon_0={}", self.central_longitude));
                parts.push(format!("+lat_ts={}", lat_1));
            }
            Projection::LatLon => {
                parts.push(format!("+lon_0={}", self.central_longitude));
            }
        }
        parts.push("+nadgrids=@null".to_string());
        parts.join(" ")
    }

    /// Parse a string written by [`CrsDescriptor::to_proj4`]
    pub fn from_proj4(s: &str) -> Result<Self, CrsError> {
        let invalid = || CrsError::InvalidProj4(s.to_string());
        let params: BTreeMap<&str, &str> = s
            .split_whitespace()
            .filter_map(|token| token.strip_prefix('+'))
            .map(|token| token.split_once('=').unwrap_or((token, "")))
            .collect();

        let number = |key: &str| -> Result<Option<f64>, CrsError> {
            params
                .get(key)
                .map(|v| v.parse::<f64>().map_err(|_| invalid()))
                .transpose()
        };

        let projection = match params.get("proj").copied() {
            Some("lcc") => Projection::LambertConformal,
            Some("stere") => Projection::PolarStereographic,
            Some("merc") => Projection::Mercator,
            Some("latlong") | Some("longlat") => Projection::LatLon,
            _ => return Err(invalid()),
        };
        let radius = number("a")?.or(number("R")?).ok_or_else(invalid)?;
        let central_longitude = number("lon_0")?.unwrap_or(0.0);
        let lat_1 = number("lat_1")?.or(number("lat_ts")?).unwrap_or(0.0);
        let lat_2 = number("lat_2")?.unwrap_or(lat_1);
        let central_latitude = number("lat_0")?.unwrap_or(0.0);

        Ok(Self {
            projection,
            central_longitude,
            central_latitude,
            standard_parallels: (lat_1, lat_2),
            radius,
        })
    }

    /// `(lon_0, lat_0, (lat_1, lat_2))` for building a Lambert conformal
    /// map projection in a plotting front end
    pub fn lambert_parameters(&self) -> Option<(f64, f64, (f64, f64))> {
        (self.projection == Projection::LambertConformal).then_some((
            self.central_longitude,
            self.central_latitude,
            self.standard_parallels,
        ))
    }
}

impl fmt::Display for CrsDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_proj4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_io::AttributeValue;

    fn lambert_attrs() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("MAP_PROJ".into(), AttributeValue::Int(1));
        attrs.insert("TRUELAT1".into(), AttributeValue::Double(30.0));
        attrs.insert("TRUELAT2".into(), AttributeValue::Double(60.0));
        attrs.insert("STAND_LON".into(), AttributeValue::Double(-98.5));
        attrs.insert("MOAD_CEN_LAT".into(), AttributeValue::Double(39.25));
        attrs
    }

    #[test]
    fn test_lambert_from_attributes() {
        let crs = CrsDescriptor::from_wrf_attributes(&lambert_attrs(), 6_370_000.0).unwrap();
        assert_eq!(crs.projection, Projection::LambertConformal);
        assert_eq!(
            crs.to_proj4(),
            "+proj=lcc +units=m +a=6370000 +b=6370000 +lat_1=30 +lat_2=60 +lat_0=39.25 +lon_0=-98.5 +nadgrids=@null"
        );
        assert_eq!(crs.lambert_parameters(), Some((-98.5, 39.25, (30.0, 60.0))));
    }

    #[test]
    fn test_proj4_round_trip() {
        let crs = CrsDescriptor::from_wrf_attributes(&lambert_attrs(), 6_370_000.0).unwrap();
        assert_eq!(CrsDescriptor::from_proj4(&crs.to_proj4()).unwrap(), crs);

        let mut polar = lambert_attrs();
        polar.insert("MAP_PROJ".into(), AttributeValue::Int(2));
        polar.insert("TRUELAT1".into(), AttributeValue::Double(-60.0));
        let crs = CrsDescriptor::from_wrf_attributes(&polar, 6_370_000.0).unwrap();
        assert_eq!(crs.central_latitude, -90.0);
        let parsed = CrsDescriptor::from_proj4(&crs.to_proj4()).unwrap();
        assert_eq!(parsed.projection, Projection::PolarStereographic);
        assert_eq!(parsed.standard_parallels.0, -60.0);
        assert!(parsed.lambert_parameters().is_none());
    }

    #[test]
    fn test_missing_and_unsupported() {
        let mut attrs = lambert_attrs();
        attrs.remove("STAND_LON");
        assert_eq!(
            CrsDescriptor::from_wrf_attributes(&attrs, 6_370_000.0),
            Err(CrsError::MissingAttribute("STAND_LON".to_string()))
        );

        let mut attrs = lambert_attrs();
        attrs.insert("MAP_PROJ".into(), AttributeValue::Int(5));
        assert_eq!(
            CrsDescriptor::from_wrf_attributes(&attrs, 6_370_000.0),
            Err(CrsError::UnsupportedProjection(5))
        );
        assert!(CrsDescriptor::from_proj4("+proj=utm +zone=33").is_err());
    }
}
