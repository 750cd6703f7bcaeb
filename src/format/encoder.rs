//! 参数编码
//!
//! 每个线程持有一个 `ParameterEncoder`，拦截代码把调用参数按顺序写入其中。
//! 状态跟踪器会把缓冲区原样复制到包装对象里，保证之后可以逐字节重建创建调用。
//! 真正的文件格式由输出端负责，这里只保证同一组参数总是得到同样的字节。

use bytemuck::Pod;

use super::HandleId;

/// 按值写入参数缓冲区的类型
pub trait Encode {
    fn encode(&self, encoder: &mut ParameterEncoder);
}

/// 参数缓冲区
#[derive(Debug, Clone, Default)]
pub struct ParameterEncoder {
    buffer: Vec<u8>,
}

impl ParameterEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空缓冲区，保留已分配的容量
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    /// 按内存布局逐字节写入 POD 值
    pub fn encode_pod<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.buffer.extend_from_slice(bytemuck::bytes_of(value));
        self
    }

    pub fn encode_handle_id(&mut self, id: HandleId) -> &mut Self {
        self.encode_pod(&id)
    }

    /// 写入带长度前缀的字节块
    pub fn encode_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.encode_pod(&(bytes.len() as u64));
        self.buffer.extend_from_slice(bytes);
        self
    }
}

macro_rules! impl_encode_pod {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, encoder: &mut ParameterEncoder) {
                    encoder.encode_pod(self);
                }
            }
        )*
    };
}

pub(crate) use impl_encode_pod;

impl_encode_pod!(u8, u16, u32, u64, i32, i64, f32);

impl Encode for usize {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode_pod(&(*self as u64));
    }
}

impl Encode for bool {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode_pod(&(*self as u32));
    }
}

/// 可空指针参数：先写一个存在标记，再写值
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        match self {
            Some(value) => {
                encoder.encode_pod(&1u32);
                value.encode(encoder);
            }
            None => {
                encoder.encode_pod(&0u32);
            }
        }
    }
}

/// 数组参数：先写元素个数
impl<T: Encode> Encode for [T] {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode_pod(&(self.len() as u32));
        for value in self {
            value.encode(encoder);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        self.as_slice().encode(encoder);
    }
}
