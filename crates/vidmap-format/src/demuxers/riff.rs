//! RIFF chunk 读取辅助 (WAV 与 AVI 共用).

use log::debug;
use vidmap_core::VidResult;

use crate::demuxer::FileMetadata;
use crate::io::IoContext;

/// chunk 头部
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    /// chunk ID, 对 LIST 为列表类型
    pub id: [u8; 4],
    /// 内容大小 (对 LIST 已扣除列表类型的 4 字节)
    pub size: u64,
    pub is_list: bool,
    /// 内容在文件中的起始偏移
    pub data_offset: u64,
}

impl ChunkHeader {
    /// 内容末尾 (含奇数填充字节)
    pub fn padded_end(&self) -> u64 {
        let raw = if self.is_list { self.size + 4 } else { self.size };
        self.data_offset + self.size + (raw & 1)
    }
}

/// 读取 chunk 头部, LIST 时一并读取列表类型
pub(crate) fn read_chunk_header(io: &mut IoContext) -> VidResult<ChunkHeader> {
    let id = io.read_tag()?;
    let size = u64::from(io.read_u32_le()?);
    if &id == b"LIST" {
        let list_type = io.read_tag()?;
        let data_offset = io.position()?;
        Ok(ChunkHeader {
            id: list_type,
            size: size.saturating_sub(4),
            is_list: true,
            data_offset,
        })
    } else {
        let data_offset = io.position()?;
        Ok(ChunkHeader {
            id,
            size,
            is_list: false,
            data_offset,
        })
    }
}

/// INFO 子 chunk ID → 标签名
fn info_tag_name(id: &[u8; 4]) -> Option<&'static str> {
    Some(match id {
        b"INAM" => "title",
        b"IART" => "artist",
        b"IPRD" => "album",
        b"ICMT" => "comment",
        b"ICRD" => "date",
        b"IGNR" => "genre",
        b"ICOP" => "copyright",
        b"ISFT" => "encoder",
        b"IENG" => "engineer",
        b"ITRK" => "track",
        _ => return None,
    })
}

/// 解析 LIST INFO 内容, `end` 为列表内容末尾
///
/// `ICRD` 同时写入创建时间.
pub(crate) fn parse_info_list(
    io: &mut IoContext,
    end: u64,
    metadata: &mut FileMetadata,
) -> VidResult<()> {
    while io.position()? + 8 <= end {
        let id = io.read_tag()?;
        let size = u64::from(io.read_u32_le()?);
        let data_offset = io.position()?;
        if data_offset + size > end {
            break;
        }
        let raw = io.read_bytes(size as usize)?;
        let value = String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .trim()
            .to_string();

        if let Some(name) = info_tag_name(&id) {
            debug!("INFO: {}={}", name, value);
            if &id == b"ICRD" && !value.is_empty() {
                metadata.creation_time = Some(value.clone());
            }
            metadata.push_tag(name, value);
        }
        io.seek_to(data_offset + size + (size & 1))?;
    }
    Ok(())
}
