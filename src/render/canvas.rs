use super::skeleton::BACKGROUND_COLOR;

/// minifb にそのまま渡せる 0RGB ピクセルバッファ
#[derive(Debug, Clone)]
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![BACKGROUND_COLOR; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.fill(BACKGROUND_COLOR);
    }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.buffer[y * self.width + x])
    }

    /// Bresenham で線を描く
    pub fn draw_line(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 範囲外は無視
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_line_endpoints_and_clip() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line((-5, 2), (4, 2), 0xFFFFFF);
        for x in 0..=4 {
            assert_eq!(canvas.pixel(x, 2), Some(0xFFFFFF));
        }
        assert_eq!(canvas.pixel(5, 2), Some(BACKGROUND_COLOR));
    }

    #[test]
    fn test_draw_diagonal_line() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line((0, 0), (9, 9), 0x123456);
        for i in 0..10 {
            assert_eq!(canvas.pixel(i, i), Some(0x123456));
        }
    }

    #[test]
    fn test_clear_resets_buffer() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line((0, 5), (9, 5), 0xFF0000);
        assert_eq!(canvas.pixel(3, 5), Some(0xFF0000));
        canvas.clear();
        assert!(canvas.buffer().iter().all(|&p| p == BACKGROUND_COLOR));
        assert_eq!(canvas.pixel(10, 0), None);
    }
}
