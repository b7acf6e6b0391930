//! 地図画像の座標変換
//!
//! 地図画像のピクセル位置を球面メルカトル (EPSG:900913) のメートル座標、
//! さらに WGS84 の経度・緯度に変換します。

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 地球の半径 (m)
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// メルカトル座標の原点オフセット (m)
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;
/// 世界地図1枚分のピクセル数
pub const TILE_SIZE: f64 = 700.0;
/// 地図画像の上端が世界地図のどの行から始まるか
pub const MAP_SHIFT_Y: f64 = 126.0;

/// 地図画像と世界地図の対応
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapProjection {
    pub tile_size: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// 地図画像1ピクセルあたりの世界地図ピクセル数の逆数
    pub scale: f64,
}

impl Default for MapProjection {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            offset_x: 0.0,
            offset_y: MAP_SHIFT_Y,
            scale: 1.0,
        }
    }
}

/// 地図画像の範囲（経度・緯度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    pub west: f64,
    pub north: f64,
    pub east: f64,
    pub south: f64,
}

impl MapProjection {
    /// 1ピクセルあたりのメートル数
    pub fn resolution(&self) -> f64 {
        2.0 * ORIGIN_SHIFT / self.tile_size
    }

    /// 地図画像のピクセル位置をメートル座標に変換（画像の行は南向き）
    pub fn pixels_to_meters(&self, px: f64, py: f64) -> (f64, f64) {
        let res = self.resolution();
        let wx = px / self.scale + self.offset_x;
        let wy = py / self.scale + self.offset_y;
        (wx * res - ORIGIN_SHIFT, ORIGIN_SHIFT - wy * res)
    }

    /// メートル座標を地図画像のピクセル位置に変換
    pub fn meters_to_pixels(&self, mx: f64, my: f64) -> (f64, f64) {
        let res = self.resolution();
        let wx = (mx + ORIGIN_SHIFT) / res;
        let wy = (ORIGIN_SHIFT - my) / res;
        ((wx - self.offset_x) * self.scale, (wy - self.offset_y) * self.scale)
    }

    /// 地図画像のピクセル位置を (経度, 緯度) に変換
    pub fn pixel_to_lon_lat(&self, px: f64, py: f64) -> (f64, f64) {
        let (mx, my) = self.pixels_to_meters(px, py);
        meters_to_lon_lat(mx, my)
    }

    /// 幅 `width`、高さ `height` の地図画像が覆う範囲
    pub fn bounds(&self, width: u32, height: u32) -> MapBounds {
        let (west, north) = self.pixel_to_lon_lat(0.0, 0.0);
        let (east, south) = self.pixel_to_lon_lat(width as f64, height as f64);
        MapBounds {
            west,
            north,
            east,
            south,
        }
    }
}

/// 球面メルカトルのメートル座標を WGS84 の (経度, 緯度) に変換
pub fn meters_to_lon_lat(mx: f64, my: f64) -> (f64, f64) {
    let lon = mx / ORIGIN_SHIFT * 180.0;
    let lat = my / ORIGIN_SHIFT * 180.0;
    let lat = 180.0 / PI * (2.0 * (lat * PI / 180.0).exp().atan() - PI / 2.0);
    (lon, lat)
}

/// WGS84 の (経度, 緯度) を球面メルカトルのメートル座標に変換
pub fn lon_lat_to_meters(lon: f64, lat: f64) -> (f64, f64) {
    let mx = lon * ORIGIN_SHIFT / 180.0;
    let my = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    (mx, my * ORIGIN_SHIFT / 180.0)
}
