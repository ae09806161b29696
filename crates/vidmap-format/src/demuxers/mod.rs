//! 解封装器实现模块.

pub mod avi;
pub mod es;
pub mod mp3;
pub mod mp4;
pub(crate) mod riff;
pub mod wav;

use crate::container::Container;
use crate::registry::DemuxerRegistry;

/// 注册所有内置解封装器
///
/// MKV, ASF, MPEG-PS/TS 等容器可被探测识别, 但没有注册解封装器.
pub fn register_all_demuxers(registry: &mut DemuxerRegistry) {
    registry.register_demuxer(Container::H264Es, "h264", es::EsDemuxer::create_h264);
    registry.register_demuxer(Container::MpegEs, "mpegvideo", es::EsDemuxer::create_mpeg);
    registry.register_demuxer(Container::Mp4, "mp4", mp4::Mp4Demuxer::create);
    registry.register_demuxer(Container::Avi, "avi", avi::AviDemuxer::create);
    registry.register_demuxer(Container::Wave, "wav", wav::WavDemuxer::create);
    registry.register_demuxer(Container::Mp3Es, "mp3", mp3::Mp3Demuxer::create);
}
