//! Arena geometry mutations.

use crate::mutation::MutationSet;
use crate::util::fmt_float;
use crate::Float;

/// Thickness of the arena boundary walls.
pub const WALL_WIDTH: Float = 0.1;
/// Robots never spawn closer than this to the arena boundary.
pub const SPAWN_MARGIN: Float = 2.0;

const ARENA_PATH: &str = ".//arena";
const SPAWN_PATH: &str = ".//arena/distribute/position";

fn wall_path(id: &str) -> String {
    format!(".//arena/*[@id='{}']", id)
}

fn triple(a: Float, b: Float, c: Float) -> String {
    format!("{}, {}, {}", fmt_float(a), fmt_float(b), fmt_float(c))
}

/// Mutations resizing an arena to `x` by `y`, including the boundary walls,
/// spawn bounds and any grids covering the arena.
pub fn shape_mutations(x: u32, y: u32) -> MutationSet {
    let (x, y) = (x as Float, y as Float);
    let mut set = MutationSet::new();
    set.push(ARENA_PATH, "size", triple(x, y, 2.0));
    set.push(ARENA_PATH, "center", triple(x / 2.0, y / 2.0, 1.0));
    set.push(
        SPAWN_PATH,
        "max",
        triple(x - SPAWN_MARGIN, y - SPAWN_MARGIN, 0.0),
    );
    set.push(SPAWN_PATH, "min", triple(SPAWN_MARGIN, SPAWN_MARGIN, 0.0));

    // north and east walls are offset inwards by half their width so they sit
    // on the arena boundary
    let north = wall_path("wall_north");
    set.push(&north, "size", triple(x, WALL_WIDTH, 0.5));
    set.push(
        &format!("{}/body", north),
        "position",
        triple(x / 2.0, y - WALL_WIDTH / 2.0, 0.0),
    );
    let south = wall_path("wall_south");
    set.push(&south, "size", triple(x, WALL_WIDTH, 0.5));
    set.push(
        &format!("{}/body", south),
        "position",
        triple(x / 2.0, 0.0, 0.0),
    );
    let east = wall_path("wall_east");
    set.push(&east, "size", triple(WALL_WIDTH, y + WALL_WIDTH, 0.5));
    set.push(
        &format!("{}/body", east),
        "position",
        triple(x - WALL_WIDTH / 2.0, y / 2.0, 0.0),
    );
    let west = wall_path("wall_west");
    set.push(&west, "size", triple(WALL_WIDTH, y + WALL_WIDTH, 0.5));
    set.push(
        &format!("{}/body", west),
        "position",
        triple(0.0, y / 2.0, 0.0),
    );

    set.push(".//arena_map/grid", "size", triple(x, y, 2.0));
    set.push(".//perception/grid", "size", triple(x, y, 2.0));

    let diagonal = (x * x + y * y).sqrt();
    set.push(
        ".//convergence/positional_entropy",
        "horizon",
        format!("0:{}", fmt_float(diagonal)),
    );
    set.push(
        ".//convergence/positional_entropy",
        "horizon_delta",
        fmt_float(diagonal / 10.0),
    );
    set
}

#[test]
fn square_arena_geometry() {
    let set = shape_mutations(16, 16);
    assert_eq!(set.effective(".//arena", "size"), Some("16, 16, 2"));
    assert_eq!(set.effective(".//arena", "center"), Some("8, 8, 1"));
    assert_eq!(
        set.effective(".//arena/distribute/position", "max"),
        Some("14, 14, 0")
    );
    assert_eq!(
        set.effective(".//arena/*[@id='wall_north']/body", "position"),
        Some("8, 15.95, 0")
    );
    assert_eq!(
        set.effective(".//arena/*[@id='wall_east']", "size"),
        Some("0.1, 16.1, 0.5")
    );
}
