use nalgebra::Matrix4;
use glow::{Context, HasContext as _};

const VERTEX_SHADER: &str = r#"#version 300 es
    precision highp float;
    uniform mat4 u_mvp;
    layout(location = 0) in vec3 a_pos;
    layout(location = 1) in vec3 a_col;
    out vec3 v_col;
    void main() {
        v_col       = a_col;
        gl_Position = u_mvp * vec4(a_pos, 1.0);
    }"#;

const FRAGMENT_SHADER: &str = r#"#version 300 es
    precision mediump float;
    in  vec3 v_col;
    out vec4 o_col;
    void main() { o_col = vec4(v_col, 1.0); }"#;

// 6 floats per vertex: xyz rgb
const FLOATS_PER_VERTEX: usize = 6;
const STRIDE: i32 = (FLOATS_PER_VERTEX * size_of::<f32>()) as i32;

/// Colored line list drawn inside an egui paint callback.
pub struct GpuLines {
    program: glow::Program,
    vao:     glow::VertexArray,
    vbo:     glow::Buffer,
    vertex_count: i32,
    u_mvp:   glow::UniformLocation,
}

// Only ever touched from the thread owning the GL context.
unsafe impl Send for GpuLines {}
unsafe impl Sync for GpuLines {}

unsafe fn compile(gl: &Context, kind: u32, source: &str) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(kind)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(info);
        }
        Ok(shader)
    }
}

impl GpuLines {
    pub unsafe fn new(gl: &Context) -> Result<Self, String> {
        unsafe {
            let vs = compile(gl, glow::VERTEX_SHADER, VERTEX_SHADER)?;
            let fs = compile(gl, glow::FRAGMENT_SHADER, FRAGMENT_SHADER)?;

            let program = gl.create_program()?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            if !gl.get_program_link_status(program) {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(info);
            }

            let u_mvp = gl
                .get_uniform_location(program, "u_mvp")
                .ok_or_else(|| "u_mvp uniform missing".to_owned())?;

            let vao = gl.create_vertex_array()?;
            let vbo = gl.create_buffer()?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, STRIDE, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, STRIDE, 12);
            gl.bind_vertex_array(None);

            Ok(Self { program, vao, vbo, vertex_count: 0, u_mvp })
        }
    }

    /// Replace the line list. `verts` holds `x y z r g b` per vertex, two vertices per line.
    pub unsafe fn upload_vertices(&mut self, gl: &Context, verts: &[f32]) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(verts),
                glow::STATIC_DRAW,
            );
        }
        self.vertex_count = i32::try_from(verts.len() / FLOATS_PER_VERTEX).unwrap_or(i32::MAX);
    }

    pub unsafe fn paint(&self, gl: &Context, mvp: Matrix4<f32>) {
        if self.vertex_count == 0 {
            return;
        }
        unsafe {
            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(Some(&self.u_mvp), false, mvp.as_slice());
            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::LINES, 0, self.vertex_count);
            gl.bind_vertex_array(None);
        }
    }

    pub unsafe fn destroy(&self, gl: &Context) {
        unsafe {
            gl.delete_program(self.program);
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
        }
    }
}
