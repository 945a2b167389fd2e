use crate::core::{BaseMap, GeoPoint, LayerSpec, MapView, Viewport};
use crate::utils::error::{InsightError, Result};
use std::f64::consts::PI;

pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;
pub const TILE_SIZE: f64 = 512.0;
pub const DEFAULT_CANVAS: (f64, f64) = (1024.0, 768.0);
const SINGLE_POINT_ZOOM: f64 = 12.0;
const MAX_ZOOM: f64 = 20.0;

/// WGS84 → Web Mercator 公尺
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat / 2.0).tan().ln();
    (x, y)
}

pub fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// 指定縮放等級下一個螢幕像素對應的投影公尺數
pub fn meters_per_pixel(zoom: f64) -> f64 {
    2.0 * PI * EARTH_RADIUS_M / (TILE_SIZE * 2f64.powf(zoom))
}

// 0..1 的世界座標
fn world_y(lat: f64) -> f64 {
    let (_, y) = project(0.0, lat);
    0.5 - y / (2.0 * PI * EARTH_RADIUS_M)
}

impl Viewport {
    /// 讓所有點落在扣除 padding 後的畫布內
    pub fn fit_bounds(&self, points: &[GeoPoint], width: f64, height: f64) -> Viewport {
        if points.is_empty() {
            return *self;
        }

        let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_lon = min_lon.min(p.lon);
            max_lon = max_lon.max(p.lon);
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
        }

        let (_, min_y) = project(0.0, min_lat);
        let (_, max_y) = project(0.0, max_lat);
        let (_, lat_center) = unproject(0.0, (min_y + max_y) / 2.0);

        let dx = (max_lon - min_lon) / 360.0;
        let dy = (world_y(min_lat) - world_y(max_lat)).abs();
        let usable_w = (width - self.padding.left - self.padding.right).max(1.0);
        let usable_h = (height - self.padding.top - self.padding.bottom).max(1.0);

        let zoom_x = (dx > 0.0).then(|| (usable_w / (dx * TILE_SIZE)).log2());
        let zoom_y = (dy > 0.0).then(|| (usable_h / (dy * TILE_SIZE)).log2());
        let zoom = match (zoom_x, zoom_y) {
            (Some(zx), Some(zy)) => zx.min(zy),
            (Some(z), None) | (None, Some(z)) => z,
            (None, None) => SINGLE_POINT_ZOOM,
        };

        Viewport {
            longitude: (min_lon + max_lon) / 2.0,
            latitude: lat_center,
            zoom: zoom.clamp(0.0, MAX_ZOOM),
            ..*self
        }
    }
}

impl MapView {
    /// 沒有地圖 token 時無法顯示底圖
    pub fn build(
        access_token: Option<&str>,
        base_map: BaseMap,
        viewport: Viewport,
        layers: &[LayerSpec],
    ) -> Result<MapView> {
        match access_token {
            Some(token) if !token.trim().is_empty() => Ok(MapView {
                style_url: base_map.style_url().to_string(),
                base_map,
                viewport,
                layers: layers.to_vec(),
            }),
            _ => Err(InsightError::MissingMapToken),
        }
    }
}
