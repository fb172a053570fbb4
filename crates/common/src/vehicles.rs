//! Vehicle contracts shared by the recognition pipeline, the registry and the
//! HTTP service.
//!
//! `VehicleDetection` values are produced per recognized region and never
//! persisted. `Vehicle` records are owned by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box in pixel coordinates of the source image.
///
/// Boxes produced by the region selector always satisfy `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Object classes the pipeline treats as vehicles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
    Motorbike,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [Self::Car, Self::Truck, Self::Bus, Self::Motorbike];

    /// Map a localizer label onto a vehicle class.
    ///
    /// COCO exports spell the two-wheeler class `motorcycle`; both spellings
    /// are accepted. Any other label is not a vehicle.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "car" => Some(Self::Car),
            "truck" => Some(Self::Truck),
            "bus" => Some(Self::Bus),
            "motorbike" | "motorcycle" => Some(Self::Motorbike),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Truck => "truck",
            Self::Bus => "bus",
            Self::Motorbike => "motorbike",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognized vehicle in one input image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetection {
    pub bounding_box: BoundingBox,
    pub vehicle_label: VehicleClass,
    pub detection_confidence: f32,
    pub color_name: String,
    /// Sanitized plate text; absent when no reading cleared the acceptance threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_confidence: Option<f32>,
}

impl VehicleDetection {
    pub fn has_plate(&self) -> bool {
        self.plate_text.is_some()
    }
}

/// A registered vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub plate_number: String,
    pub driver_name: String,
    pub car_color: Option<String>,
    pub car_type: Option<String>,
    #[serde(with = "registration_date_format")]
    pub registration_date: DateTime<Utc>,
    pub qr_code_path: Option<String>,
    pub driver_photo_path: Option<String>,
}

/// Fields of a vehicle record before the store assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewVehicle {
    pub plate_number: String,
    pub driver_name: String,
    pub car_color: Option<String>,
    pub car_type: Option<String>,
    pub registration_date: DateTime<Utc>,
    pub qr_code_path: Option<String>,
    pub driver_photo_path: Option<String>,
}

impl NewVehicle {
    pub fn into_vehicle(self, id: i64) -> Vehicle {
        Vehicle {
            id,
            plate_number: self.plate_number,
            driver_name: self.driver_name,
            car_color: self.car_color,
            car_type: self.car_type,
            registration_date: self.registration_date,
            qr_code_path: self.qr_code_path,
            driver_photo_path: self.driver_photo_path,
        }
    }
}

/// Uploaded driver photo
#[derive(Clone, PartialEq)]
pub struct DriverPhoto {
    /// File name as supplied by the client, unsanitized
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for DriverPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverPhoto")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Input to the registration workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterVehicleRequest {
    pub plate_number: String,
    pub driver_name: String,
    pub car_color: Option<String>,
    pub car_type: Option<String>,
    pub driver_photo: Option<DriverPhoto>,
}

/// Payload encoded into the registration QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub plate_number: String,
    pub driver_name: String,
    pub car_color: Option<String>,
    pub car_type: Option<String>,
}

impl From<&Vehicle> for CredentialPayload {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            plate_number: vehicle.plate_number.clone(),
            driver_name: vehicle.driver_name.clone(),
            car_color: vehicle.car_color.clone(),
            car_type: vehicle.car_type.clone(),
        }
    }
}

/// `%Y-%m-%d %H:%M:%S` in UTC, the format clients of the registry already parse
pub mod registration_date_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_vehicle_class_from_label() {
        assert_eq!(VehicleClass::from_label("car"), Some(VehicleClass::Car));
        assert_eq!(VehicleClass::from_label("Truck"), Some(VehicleClass::Truck));
        assert_eq!(VehicleClass::from_label("bus"), Some(VehicleClass::Bus));
        assert_eq!(
            VehicleClass::from_label("motorcycle"),
            Some(VehicleClass::Motorbike)
        );
        assert_eq!(
            VehicleClass::from_label("motorbike"),
            Some(VehicleClass::Motorbike)
        );
        assert_eq!(VehicleClass::from_label("person"), None);
        assert_eq!(VehicleClass::from_label("bicycle"), None);
    }

    #[test]
    fn test_detection_omits_absent_plate() {
        let detection = VehicleDetection {
            bounding_box: BoundingBox {
                x1: 1,
                y1: 2,
                x2: 30,
                y2: 40,
            },
            vehicle_label: VehicleClass::Car,
            detection_confidence: 0.9,
            color_name: "blue".to_string(),
            plate_text: None,
            plate_confidence: None,
        };

        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(json["vehicle_label"], "car");
        assert!(json.get("plate_text").is_none());
        assert!(json.get("plate_confidence").is_none());
    }

    #[test]
    fn test_registration_date_format() {
        let vehicle = Vehicle {
            id: 7,
            plate_number: "XYZ-999".to_string(),
            driver_name: "Dana".to_string(),
            car_color: Some("red".to_string()),
            car_type: None,
            registration_date: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
            qr_code_path: Some("qr_codes/XYZ-999.png".to_string()),
            driver_photo_path: None,
        };

        let json = serde_json::to_value(&vehicle).unwrap();
        assert_eq!(json["registration_date"], "2024-03-09 14:05:00");

        let parsed: Vehicle = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, vehicle);
    }
}
