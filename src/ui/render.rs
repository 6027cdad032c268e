// Software drawing primitives for the softbuffer framebuffer (0x00RRGGBB).

pub const BG_COLOR: [u8; 4] = [31, 31, 31, 255];

pub type Rgba = (u8, u8, u8, u8);

pub const WHITE: Rgba = (255, 255, 255, 255);
pub const ERROR_RED: Rgba = (255, 80, 80, 255);

/// Column-major 5x7 glyph, LSB = top row. Lowercase letters share the
/// uppercase shapes; anything without a glyph renders as a blank cell.
fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x42, 0x61, 0x51, 0x49, 0x46],
        '3' => [0x21, 0x41, 0x45, 0x4B, 0x31],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        'A' => [0x7E, 0x11, 0x11, 0x11, 0x7E],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x22, 0x1C],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x7A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'J' => [0x20, 0x40, 0x41, 0x3F, 0x01],
        'K' => [0x7F, 0x08, 0x14, 0x22, 0x41],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'M' => [0x7F, 0x02, 0x0C, 0x02, 0x7F],
        'N' => [0x7F, 0x04, 0x08, 0x10, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'Q' => [0x3E, 0x41, 0x51, 0x21, 0x5E],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x46, 0x49, 0x49, 0x49, 0x31],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'U' => [0x3F, 0x40, 0x40, 0x40, 0x3F],
        'V' => [0x1F, 0x20, 0x40, 0x20, 0x1F],
        'W' => [0x3F, 0x40, 0x38, 0x40, 0x3F],
        'X' => [0x63, 0x14, 0x08, 0x14, 0x63],
        'Y' => [0x07, 0x08, 0x70, 0x08, 0x07],
        'Z' => [0x61, 0x51, 0x49, 0x45, 0x43],
        '/' => [0x20, 0x10, 0x08, 0x04, 0x02],
        ':' => [0x00, 0x36, 0x36, 0x00, 0x00],
        '.' => [0x00, 0x60, 0x60, 0x00, 0x00],
        ',' => [0x00, 0x50, 0x30, 0x00, 0x00],
        '-' => [0x08, 0x08, 0x08, 0x08, 0x08],
        '_' => [0x40, 0x40, 0x40, 0x40, 0x40],
        '(' => [0x00, 0x1C, 0x22, 0x41, 0x00],
        ')' => [0x00, 0x41, 0x22, 0x1C, 0x00],
        '\'' => [0x00, 0x05, 0x03, 0x00, 0x00],
        '?' => [0x02, 0x01, 0x51, 0x09, 0x06],
        '!' => [0x00, 0x00, 0x5F, 0x00, 0x00],
        _ => [0; 5],
    }
}

/// Pack RGB into softbuffer u32 format: 0x00RRGGBB.
pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn unpack_rgb(v: u32) -> (u8, u8, u8) {
    ((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

fn blend(dst: u32, (r, g, b, a): Rgba) -> u32 {
    let a = a as u32;
    let inv = 255 - a;
    let (dr, dg, db) = unpack_rgb(dst);
    rgb(
        ((r as u32 * a + dr as u32 * inv) / 255) as u8,
        ((g as u32 * a + dg as u32 * inv) / 255) as u8,
        ((b as u32 * a + db as u32 * inv) / 255) as u8,
    )
}

/// Width in pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * 6 * scale
}

fn draw_char(buf: &mut [u32], stride: u32, buf_h: u32, ch: char, px: i32, py: i32, scale: u32, color: Rgba) {
    let glyph = glyph(ch);
    for (col, bits) in glyph.iter().enumerate() {
        for row in 0..7u32 {
            if bits & (1 << row) == 0 {
                continue;
            }
            let gx = px + (col as u32 * scale) as i32;
            let gy = py + (row * scale) as i32;
            fill_rect(buf, stride, buf_h, gx, gy, scale, scale, color);
        }
    }
}

/// Draw a string. Returns the x position after the last character.
pub fn draw_text(buf: &mut [u32], stride: u32, buf_h: u32, text: &str, px: i32, py: i32, scale: u32, color: Rgba) -> i32 {
    let mut x = px;
    for ch in text.chars() {
        draw_char(buf, stride, buf_h, ch, x, py, scale, color);
        x += (6 * scale) as i32;
    }
    x
}

/// Fill a rectangle with alpha blending, clipped to the framebuffer.
pub fn fill_rect(buf: &mut [u32], stride: u32, buf_h: u32, rx: i32, ry: i32, rw: u32, rh: u32, color: Rgba) {
    let x_start = rx.max(0) as u32;
    let y_start = ry.max(0) as u32;
    let x_end = (rx + rw as i32).clamp(0, stride as i32) as u32;
    let y_end = (ry + rh as i32).clamp(0, buf_h as i32) as u32;
    for y in y_start..y_end {
        let row = (y * stride) as usize;
        for x in x_start..x_end {
            let off = row + x as usize;
            buf[off] = blend(buf[off], color);
        }
    }
}

/// Copy an RGBA8 image centred into the framebuffer at 1:1, blending by alpha.
pub fn blit_centered(dst: &mut [u32], dst_w: u32, dst_h: u32, src: &[u8], src_w: u32, src_h: u32) {
    let x0 = (dst_w as i64 - src_w as i64) / 2;
    let y0 = (dst_h as i64 - src_h as i64) / 2;

    for sy in 0..src_h {
        let dy = y0 + sy as i64;
        if dy < 0 || dy >= dst_h as i64 {
            continue;
        }
        for sx in 0..src_w {
            let dx = x0 + sx as i64;
            if dx < 0 || dx >= dst_w as i64 {
                continue;
            }
            let si = (sy as usize * src_w as usize + sx as usize) * 4;
            let di = dy as usize * dst_w as usize + dx as usize;
            let px = (src[si], src[si + 1], src[si + 2], src[si + 3]);
            dst[di] = if px.3 == 255 { rgb(px.0, px.1, px.2) } else { blend(dst[di], px) };
        }
    }
}
