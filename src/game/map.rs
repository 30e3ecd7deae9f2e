//! Static level geometry

use serde::{Deserialize, Serialize};

use super::physics::{BodyCategory, StaticBodyDesc, Vec2};

/// World width in pixels
pub const WORLD_WIDTH: f32 = 800.0;
/// World height in pixels
pub const WORLD_HEIGHT: f32 = 600.0;
const WALL_THICKNESS: f32 = 50.0;

/// Axis-aligned rectangle, positioned by its centre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    fn new(id: &str, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: id.to_string(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn body_desc(&self, category: BodyCategory) -> StaticBodyDesc {
        StaticBodyDesc {
            position: Vec2::new(self.x, self.y),
            width: self.width,
            height: self.height,
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    /// World bounds, always solid
    pub walls: Vec<Rect>,
    /// One-way platforms
    pub platforms: Vec<Rect>,
}

impl GameMap {
    pub fn width(&self) -> f32 {
        WORLD_WIDTH
    }

    pub fn height(&self) -> f32 {
        WORLD_HEIGHT
    }

    /// Every rectangle with the collision category it is created with
    pub fn static_bodies(&self) -> impl Iterator<Item = StaticBodyDesc> + '_ {
        let walls = self.walls.iter().map(|w| w.body_desc(BodyCategory::Wall));
        let platforms = self
            .platforms
            .iter()
            .map(|p| p.body_desc(BodyCategory::Platform));
        walls.chain(platforms)
    }
}

/// The default arena: four boundary walls and three platforms
pub fn create_map() -> GameMap {
    let (w, h, t) = (WORLD_WIDTH, WORLD_HEIGHT, WALL_THICKNESS);

    let walls = vec![
        Rect::new("wall-top", w / 2.0, -(t / 2.0), w + t * 2.0, t),
        Rect::new("wall-bottom", w / 2.0, h + t / 2.0, w + t * 2.0, t),
        Rect::new("wall-left", -(t / 2.0), h / 2.0, t, h + t * 2.0),
        Rect::new("wall-right", w + t / 2.0, h / 2.0, t, h + t * 2.0),
    ];

    let platforms = vec![
        Rect::new("platform-1", 200.0, 400.0, 150.0, 20.0),
        Rect::new("platform-2", 600.0, 300.0, 150.0, 20.0),
        Rect::new("platform-3", 400.0, 200.0, 200.0, 20.0),
    ];

    GameMap { walls, platforms }
}
