use std::path::Path;
use tiled_panorama::panorama::PanoramaDescriptor;
use tiled_panorama::TourConfig;

#[test]
fn bundled_tour_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/tour.json");
    let tour = TourConfig::load(&path).unwrap();

    assert_eq!(tour.start, "lobby");
    let lobby: &PanoramaDescriptor = tour.panorama("lobby").unwrap();
    assert_eq!(lobby.buttons.len(), 1);
    assert_eq!(lobby.buttons[0].next_panorama_key, "courtyard");
    assert_eq!(lobby.level_key_for_fov(tour.viewer.initial_fov), Some("medium"));
    assert_eq!(tour.viewer.animation_duration_ms, 800);
}
