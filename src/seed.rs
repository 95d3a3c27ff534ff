use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::model::{Equipment, Room};

/// The ten-room inventory used when no inventory file is configured.
pub fn default_rooms() -> Vec<Room> {
    use Equipment::*;
    vec![
        Room::new("R1", "Alpha", 4, [Whiteboard]),
        Room::new("R2", "Beta", 6, [Projector]),
        Room::new("R3", "Gamma", 6, [VideoConferencing]),
        Room::new("R4", "Delta", 8, [Projector, Whiteboard]),
        Room::new("R5", "Epsilon", 10, [VideoConferencing, Whiteboard]),
        Room::new("R6", "Zeta", 12, [Projector, VideoConferencing]),
        Room::new("R7", "Eta", 12, [Projector, VideoConferencing, Whiteboard]),
        Room::new("R8", "Theta", 16, [Projector]),
        Room::new("R9", "Iota", 20, [VideoConferencing]),
        Room::new("R10", "Kappa", 20, [Projector, VideoConferencing, Whiteboard]),
    ]
}

/// Read a JSON array of rooms:
/// `[{"id": "R1", "name": "Alpha", "capacity": 4, "equipment": ["whiteboard"]}]`
pub fn load_rooms(path: &Path) -> io::Result<Vec<Room>> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("roomwise_test_seed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn default_inventory_is_well_formed() {
        let rooms = default_rooms();
        assert_eq!(rooms.len(), 10);
        assert!(rooms.iter().all(|r| r.capacity > 0));
        let mut ids: Vec<_> = rooms.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn load_from_json() {
        let path = temp_file(
            "rooms.json",
            r#"[
                {"id": "A", "name": "Aquarium", "capacity": 3, "equipment": ["whiteboard", "tvconf"]},
                {"id": "B", "name": "Boiler Room", "capacity": 12}
            ]"#,
        );
        let rooms = load_rooms(&path).unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms[0].equipment.contains(Equipment::VideoConferencing));
        assert!(rooms[1].equipment.is_empty());
    }

    #[test]
    fn unknown_equipment_is_invalid_data() {
        let path = temp_file(
            "bad_rooms.json",
            r#"[{"id": "A", "name": "A", "capacity": 3, "equipment": ["espresso"]}]"#,
        );
        let err = load_rooms(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_rooms(Path::new("/nonexistent/roomwise/rooms.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
